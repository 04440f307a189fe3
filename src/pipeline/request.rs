use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const NAME_MAX_CHARS: usize = 50;
pub const AGE_MIN: i64 = 1;
pub const AGE_MAX: i64 = 119;
pub const SYMPTOMS_MIN_CHARS: usize = 5;
pub const SYMPTOMS_MAX_CHARS: usize = 500;

/// A validated triage submission. Only obtainable through [`TriageRequest::parse`]
/// or [`TriageRequest::from_value`], so every instance satisfies the field bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageRequest {
    name: String,
    age: u8,
    symptoms: String,
}

#[derive(Debug, Error)]
#[error("request body is not valid JSON: {0}")]
pub struct MalformedInputError(#[from] serde_json::Error);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl TriageRequest {
    /// Parse a raw request body. JSON syntax is checked before any field rule.
    pub fn parse(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(MalformedInputError::from)?;
        Ok(Self::from_value(&value)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let fields = value
            .as_object()
            .ok_or_else(|| ValidationError::new("body", "expected a JSON object"))?;

        let name = required_str(fields.get("name"), "name")?;
        let name_len = name.chars().count();
        if name_len == 0 || name_len > NAME_MAX_CHARS {
            return Err(ValidationError::new(
                "name",
                format!("must be between 1 and {NAME_MAX_CHARS} characters, got {name_len}"),
            ));
        }

        let age = match fields.get("age") {
            None | Some(Value::Null) => return Err(ValidationError::new("age", "field required")),
            Some(Value::Number(n)) => whole_number(n)
                .ok_or_else(|| ValidationError::new("age", "must be a whole number"))?,
            Some(_) => return Err(ValidationError::new("age", "must be an integer")),
        };
        if !(AGE_MIN..=AGE_MAX).contains(&age) {
            return Err(ValidationError::new(
                "age",
                format!("must be greater than 0 and less than 120, got {age}"),
            ));
        }

        let symptoms = required_str(fields.get("symptoms"), "symptoms")?;
        let symptoms_len = symptoms.chars().count();
        if !(SYMPTOMS_MIN_CHARS..=SYMPTOMS_MAX_CHARS).contains(&symptoms_len) {
            return Err(ValidationError::new(
                "symptoms",
                format!(
                    "must be between {SYMPTOMS_MIN_CHARS} and {SYMPTOMS_MAX_CHARS} characters, got {symptoms_len}"
                ),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            // bounds checked above
            age: age as u8,
            symptoms: symptoms.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> u8 {
        self.age
    }

    pub fn symptoms(&self) -> &str {
        &self.symptoms
    }
}

// Exact-integer floats such as `36.0` count as whole numbers.
fn whole_number(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn required_str<'a>(value: Option<&'a Value>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::new(field, "field required")),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::new(field, "must be a string")),
    }
}
