//! Ingestion service - authentication, validation and idempotent insert

use chrono::{DateTime, Utc};
use contracts::{
    radar_id_problem, Direction, FieldError, IngestReply, MeasurementId, MeasurementSubmission,
    ReplyStatus,
};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use crate::record::{InsertOutcome, StoredRecord};
use crate::store::RecordStore;

/// Result of one ingestion request
#[derive(Debug, Clone, PartialEq)]
pub enum IngestResponse {
    /// Stored for the first time
    Created(MeasurementId),
    /// Already stored; no second record
    Duplicate(MeasurementId),
    /// Malformed payload; resending unchanged cannot succeed
    Invalid { errors: Vec<FieldError> },
    /// Missing or wrong bearer token
    Unauthorized,
    /// Store failed; the sender should retry
    StoreFailure { message: String },
}

impl IngestResponse {
    /// HTTP status carrying this response
    pub fn status_code(&self) -> u16 {
        match self {
            IngestResponse::Created(_) => 201,
            IngestResponse::Duplicate(_) => 200,
            IngestResponse::Invalid { .. } => 400,
            IngestResponse::Unauthorized => 401,
            IngestResponse::StoreFailure { .. } => 500,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestResponse::Created(_) => "created",
            IngestResponse::Duplicate(_) => "duplicate",
            IngestResponse::Invalid { .. } => "invalid",
            IngestResponse::Unauthorized => "unauthorized",
            IngestResponse::StoreFailure { .. } => "store_failure",
        }
    }

    /// JSON reply body
    pub fn reply(&self) -> IngestReply {
        let (status, id, errors, message) = match self {
            IngestResponse::Created(id) => (ReplyStatus::Created, Some(*id), vec![], None),
            IngestResponse::Duplicate(id) => (ReplyStatus::Duplicate, Some(*id), vec![], None),
            IngestResponse::Invalid { errors } => {
                (ReplyStatus::Invalid, None, errors.clone(), None)
            }
            IngestResponse::Unauthorized => (
                ReplyStatus::Unauthorized,
                None,
                vec![],
                Some("missing or invalid bearer token".to_string()),
            ),
            IngestResponse::StoreFailure { message } => {
                (ReplyStatus::Error, None, vec![], Some(message.clone()))
            }
        };
        IngestReply {
            status,
            id,
            errors,
            message,
        }
    }
}

/// Central-side ingestion contract
pub struct IngestionService<S> {
    store: S,
    api_token: String,
}

impl<S: RecordStore> IngestionService<S> {
    pub fn new(store: S, api_token: impl Into<String>) -> Self {
        Self {
            store,
            api_token: api_token.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// True when `bearer` matches the configured token
    pub fn authorize(&self, bearer: Option<&str>) -> bool {
        bearer.is_some_and(|token| token_eq(token, &self.api_token))
    }

    #[instrument(name = "central_ingest", skip_all)]
    pub async fn ingest(&self, bearer: Option<&str>, body: &[u8]) -> IngestResponse {
        let response = self.ingest_inner(bearer, body).await;
        observability::record_ingest(response.label());
        response
    }

    async fn ingest_inner(&self, bearer: Option<&str>, body: &[u8]) -> IngestResponse {
        if !self.authorize(bearer) {
            warn!("Rejected ingestion with bad credentials");
            return IngestResponse::Unauthorized;
        }

        let submission = match parse_submission(body) {
            Ok(submission) => submission,
            Err(errors) => {
                debug!(errors = errors.len(), "Invalid submission");
                return IngestResponse::Invalid { errors };
            }
        };

        let id = submission.id;
        let record = StoredRecord::new(submission, Utc::now());
        match self.store.insert_if_absent(record).await {
            Ok(InsertOutcome::Inserted) => {
                debug!(%id, "Measurement stored");
                IngestResponse::Created(id)
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                debug!(%id, "Duplicate measurement absorbed");
                IngestResponse::Duplicate(id)
            }
            Err(e) => {
                error!(%id, error = %e, "Failed to store measurement");
                IngestResponse::StoreFailure {
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Length-independent comparison so response timing does not leak the prefix
fn token_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

/// Parse and validate a submission body, collecting every field problem
pub fn parse_submission(body: &[u8]) -> Result<MeasurementSubmission, Vec<FieldError>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| vec![FieldError::new("body", format!("invalid JSON: {e}"))])?;
    let Value::Object(obj) = value else {
        return Err(vec![FieldError::new("body", "expected a JSON object")]);
    };

    let mut errors = Vec::new();

    let id = required(&obj, "id", &mut errors).and_then(|v| match v.as_str() {
        Some(s) => match s.parse::<MeasurementId>() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new("id", "must be a UUID"));
                None
            }
        },
        None => {
            errors.push(FieldError::new("id", "must be a string"));
            None
        }
    });

    let radar_id = required(&obj, "radar_id", &mut errors).and_then(|v| match v.as_str() {
        Some(s) => match radar_id_problem(s) {
            Some(problem) => {
                errors.push(FieldError::new("radar_id", problem));
                None
            }
            None => Some(s.to_string()),
        },
        None => {
            errors.push(FieldError::new("radar_id", "must be a string"));
            None
        }
    });

    let radar_name = match obj.get("radar_name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new("radar_name", "must be a string"));
            None
        }
    };

    let captured_at = required(&obj, "captured_at", &mut errors).and_then(|v| {
        match v.as_str().map(DateTime::parse_from_rfc3339) {
            Some(Ok(t)) => Some(t.with_timezone(&Utc)),
            _ => {
                errors.push(FieldError::new("captured_at", "must be an RFC 3339 timestamp"));
                None
            }
        }
    });

    let speed_kmh = required(&obj, "speed_kmh", &mut errors).and_then(|v| match v.as_f64() {
        Some(s) if s.is_finite() && s >= 0.0 => Some(s),
        Some(_) => {
            errors.push(FieldError::new("speed_kmh", "must be a non-negative number"));
            None
        }
        None => {
            errors.push(FieldError::new("speed_kmh", "must be a number"));
            None
        }
    });

    let direction = required(&obj, "direction", &mut errors).and_then(|v| {
        match serde_json::from_value::<Direction>(v.clone()) {
            Ok(d) => Some(d),
            Err(_) => {
                errors.push(FieldError::new("direction", "must be \"A->B\" or \"B->A\""));
                None
            }
        }
    });

    let over_limit = required(&obj, "over_limit", &mut errors).and_then(|v| match v.as_bool() {
        Some(b) => Some(b),
        None => {
            errors.push(FieldError::new("over_limit", "must be a boolean"));
            None
        }
    });

    match (id, radar_id, captured_at, speed_kmh, direction, over_limit) {
        (Some(id), Some(radar_id), Some(captured_at), Some(speed_kmh), Some(direction), Some(over_limit))
            if errors.is_empty() =>
        {
            Ok(MeasurementSubmission {
                id,
                radar_id,
                radar_name,
                captured_at,
                speed_kmh,
                direction,
                over_limit,
            })
        }
        _ => Err(errors),
    }
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Value> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(v) => Some(v),
    }
}
