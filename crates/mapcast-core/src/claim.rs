//! Claim model and batch document parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The current asserted owner and location of a network address.
///
/// Field names on the wire (batch files, stored rows) follow the submission
/// format: `ip, name, asn, colo, country, region, metro, city, time_ms`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Network address; primary key of the claim table.
    #[serde(rename = "ip")]
    pub address: String,

    /// Name the address is claimed for.
    #[serde(rename = "name")]
    pub claimant_name: String,

    /// Autonomous system number of the claiming connection.
    #[serde(default)]
    pub asn: Option<i64>,

    /// Point-of-presence that recorded the claim.
    #[serde(rename = "colo", default)]
    pub pop: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub metro: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    /// Claim time in epoch milliseconds.
    #[serde(rename = "time_ms")]
    pub claimed_at_ms: i64,
}

/// Incoming records share the stored claim shape.
pub type IncomingClaimRecord = Claim;

impl Claim {
    /// Create a claim with no territory attributes.
    pub fn new(address: impl Into<String>, claimant_name: impl Into<String>, claimed_at_ms: i64) -> Self {
        Self {
            address: address.into(),
            claimant_name: claimant_name.into(),
            asn: None,
            pop: None,
            country: None,
            region: None,
            metro: None,
            city: None,
            claimed_at_ms,
        }
    }

    pub fn with_pop(mut self, pop: impl Into<String>) -> Self {
        self.pop = Some(pop.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Parse one claim object, rejecting records that lack an identity.
    pub fn from_value(value: Value) -> Result<Self, MalformedClaim> {
        let claim: Claim = serde_json::from_value(value).map_err(|e| MalformedClaim {
            address: None,
            reason: e.to_string(),
        })?;
        if claim.address.is_empty() {
            return Err(MalformedClaim {
                address: None,
                reason: "empty ip".to_string(),
            });
        }
        if claim.claimant_name.is_empty() {
            return Err(MalformedClaim {
                address: Some(claim.address),
                reason: "empty name".to_string(),
            });
        }
        Ok(claim)
    }
}

/// A record in a batch document that could not be turned into a [`Claim`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed claim record: {reason}")]
pub struct MalformedClaim {
    /// Address of the record, when it could be read.
    pub address: Option<String>,
    pub reason: String,
}

/// Parse a batch file.
///
/// The document is either a single claim object or a wrapper
/// `{"batch": [claim, ...]}`. Each record is validated on its own so one bad
/// record does not take its siblings down; a document that is not a JSON
/// object fails as a whole.
pub fn parse_document(text: &str) -> Result<Vec<Result<Claim, MalformedClaim>>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a claim object or batch wrapper, got {}",
                json_kind(&other)
            )))
        }
    };

    match object.remove("batch") {
        Some(Value::Array(records)) => Ok(records.into_iter().map(Claim::from_value).collect()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "batch must be an array, got {}",
            json_kind(&other)
        ))),
        None => Ok(vec![Claim::from_value(Value::Object(object))]),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_claim() {
        let doc = r#"{"ip":"1.2.3.4","name":"alice","asn":13335,"colo":"SJC","country":"US",
                      "region":"California","metro":"807","city":"San Jose","time_ms":1700000000000}"#;
        let claims = parse_document(doc).unwrap();
        assert_eq!(claims.len(), 1);

        let claim = claims[0].as_ref().unwrap();
        assert_eq!(claim.address, "1.2.3.4");
        assert_eq!(claim.claimant_name, "alice");
        assert_eq!(claim.asn, Some(13335));
        assert_eq!(claim.pop.as_deref(), Some("SJC"));
        assert_eq!(claim.city.as_deref(), Some("San Jose"));
        assert_eq!(claim.claimed_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn parse_batch_wrapper_ignores_extra_keys() {
        let doc = r#"{"batch":[
                {"ip":"1.2.3.4","name":"alice","time_ms":1},
                {"ip":"5.6.7.8","name":"bob","colo":null,"time_ms":2}
            ],"workerId":"01HX","workerTimestamp":5}"#;
        let claims = parse_document(doc).unwrap();
        assert_eq!(claims.len(), 2);
        assert!(claims.iter().all(|c| c.is_ok()));
        assert_eq!(claims[1].as_ref().unwrap().pop, None);
    }

    #[test]
    fn malformed_record_does_not_poison_batch() {
        let doc = r#"{"batch":[
                {"ip":"1.2.3.4","name":"alice","time_ms":1},
                {"ip":"5.6.7.8","time_ms":2},
                {"ip":"9.9.9.9","name":"","time_ms":3}
            ]}"#;
        let claims = parse_document(doc).unwrap();
        assert!(claims[0].is_ok());

        let missing_name = claims[1].as_ref().unwrap_err();
        assert!(missing_name.reason.contains("name"));

        let empty_name = claims[2].as_ref().unwrap_err();
        assert_eq!(empty_name.address.as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn non_object_document_fails() {
        assert!(parse_document("[1,2,3]").is_err());
        assert!(parse_document("not json").is_err());
        assert!(parse_document(r#"{"batch":{"ip":"1.2.3.4"}}"#).is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let claim = Claim::new("1.2.3.4", "alice", 10).with_pop("SJC");
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["ip"], "1.2.3.4");
        assert_eq!(json["name"], "alice");
        assert_eq!(json["colo"], "SJC");
        assert_eq!(json["time_ms"], 10);
    }
}
