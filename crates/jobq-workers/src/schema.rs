//! Job argument schemas and binding.
//!
//! A schema is declared once at registration time: the ordered parameter
//! names a handler accepts, each either required or carrying a default.
//! Binding a decoded mapping against a schema is a pure function, so argument
//! validation can run both at enqueue time (failing fast in the producer) and
//! at dispatch time (guarding the handler).

use crate::codecs::JobKwargs;
use crate::error::WorkerError;
use serde_json::Value;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// One declared handler parameter
#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    default: Option<Value>,
}

/// Declared parameters of a job handler, in declaration order
#[derive(Debug, Clone, Default)]
pub struct JobSchema {
    params: Vec<ParamSpec>,
}

impl JobSchema {
    /// Create an empty schema (a handler taking no arguments)
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter
    pub fn required(mut self, name: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            default: None,
        });
        self
    }

    /// Declare an optional parameter with a default value
    pub fn optional(mut self, name: &str, default: Value) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            default: Some(default),
        });
        self
    }

    /// Number of declared parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check whether the schema declares no parameters
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Bind a decoded mapping against this schema.
    ///
    /// Unknown keys fail with `UnexpectedArgument`; missing keys fall back to
    /// their declared default or fail with `MissingArgument`. The bound
    /// result carries every declared parameter.
    pub fn bind(&self, job_name: &str, kwargs: &JobKwargs) -> Result<JobKwargs, WorkerError> {
        for key in kwargs.keys() {
            if !self.params.iter().any(|p| p.name == *key) {
                return Err(WorkerError::UnexpectedArgument {
                    job_name: job_name.to_string(),
                    argument: key.clone(),
                });
            }
        }

        let mut bound = JobKwargs::new();
        for param in &self.params {
            match kwargs.get(&param.name) {
                Some(value) => {
                    bound.insert(param.name.clone(), value.clone());
                }
                None => match &param.default {
                    Some(default) => {
                        bound.insert(param.name.clone(), default.clone());
                    }
                    None => {
                        return Err(WorkerError::MissingArgument {
                            job_name: job_name.to_string(),
                            argument: param.name.clone(),
                        });
                    }
                },
            }
        }

        Ok(bound)
    }

    /// Bind a single positional value to the first declared parameter.
    ///
    /// Convenience for one-argument jobs; remaining parameters fall back to
    /// their defaults.
    pub fn bind_first(&self, job_name: &str, value: Value) -> Result<JobKwargs, WorkerError> {
        let Some(first) = self.params.first() else {
            return Err(WorkerError::UnexpectedArgument {
                job_name: job_name.to_string(),
                argument: "<positional>".to_string(),
            });
        };

        let mut kwargs = JobKwargs::new();
        kwargs.insert(first.name.clone(), value);
        self.bind(job_name, &kwargs)
    }
}

#[cfg(test)]
pub(crate) fn kwargs_from(value: Value) -> JobKwargs {
    value.as_object().cloned().unwrap_or_default()
}
