use super::error::AgentError;
use super::message::{Request, Response};
use serde::{Deserialize, Serialize};

pub const DRIVER_MAGIC: &[u8] = b"dbagent-rpc-v1\0";
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub fn encode_request(req: &Request) -> Result<Vec<u8>, AgentError> {
    encode_message(req)
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, AgentError> {
    encode_message(resp)
}

/// Serialize `msg` and prepend its length as 4 big-endian bytes
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, AgentError> {
    let payload = rmp_serde::to_vec_named(msg)
        .map_err(|e| AgentError::MalformedMessage(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(AgentError::MessageTooLarge);
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame payload (without its length prefix)
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, AgentError> {
    rmp_serde::from_slice(data)
        .map_err(|e| AgentError::MalformedMessage(format!("Deserialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ops, ClassType, ColumnDescriptor, ErrorDescriptor, ErrorKind, ObjectKey, Outcome,
        ResultBatch, SqlType, Value,
    };
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_request_roundtrip() {
        let mut req = Request::new(
            Some(ObjectKey(12)),
            ClassType::PreparedStatement,
            ops::SET_TIMESTAMP,
            vec![
                Value::Int(1),
                Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            ],
        );
        req.correlation_id = 99;

        let encoded = encode_request(&req).unwrap();
        let len = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(len, encoded.len() - 4);

        let decoded: Request = decode_message(&encoded[4..]).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_bootstrap_request_has_no_target() {
        let req = Request::new(None, ClassType::Connection, ops::CONNECT, vec![]);
        let encoded = encode_request(&req).unwrap();
        let decoded: Request = decode_message(&encoded[4..]).unwrap();
        assert!(decoded.target_key.is_none());
    }

    #[test]
    fn test_batch_response_roundtrip() {
        let req = Request::new(Some(ObjectKey(3)), ClassType::ResultSet, ops::FETCH_BATCH, vec![]);
        let batch = ResultBatch {
            rows: vec![
                vec![Value::Long(1), Value::String("alice".into()), Value::Bytes(vec![0, 255])],
                vec![Value::Long(2), Value::Null, Value::Bytes(vec![])],
            ],
            exhausted: true,
        };
        let resp = Response::reply(&req, Outcome::Success(Value::Batch(batch.clone())));

        let encoded = encode_response(&resp).unwrap();
        let decoded: Response = decode_message(&encoded[4..]).unwrap();
        assert_eq!(decoded.outcome, Outcome::Success(Value::Batch(batch)));
        assert_eq!(decoded.operation, ops::FETCH_BATCH);
    }

    #[test]
    fn test_metadata_and_failure_roundtrip() {
        let req = Request::new(Some(ObjectKey(3)), ClassType::ResultSet, ops::FETCH_METADATA, vec![]);
        let meta = vec![ColumnDescriptor::new("id", SqlType::Integer)];
        let resp = Response::reply(&req, Outcome::Success(Value::Metadata(meta.clone())));
        let decoded: Response = decode_message(&encode_response(&resp).unwrap()[4..]).unwrap();
        assert_eq!(decoded.outcome, Outcome::Success(Value::Metadata(meta)));

        let failure = ErrorDescriptor::new(ErrorKind::StaleReference, "key #3 is not live");
        let resp = Response::reply(&req, Outcome::Failure(failure.clone()));
        let decoded: Response = decode_message(&encode_response(&resp).unwrap()[4..]).unwrap();
        assert_eq!(decoded.outcome, Outcome::Failure(failure));
    }

    #[test]
    fn test_truncated_input_is_malformed() {
        let req = Request::new(Some(ObjectKey(1)), ClassType::Statement, ops::EXECUTE_QUERY, vec![
            Value::String("select * from t_user".into()),
        ]);
        let encoded = encode_request(&req).unwrap();
        let truncated = &encoded[4..encoded.len() - 5];

        let err = decode_message::<Request>(truncated).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MalformedMessage));
    }

    #[test]
    fn test_type_tag_mismatch_is_malformed() {
        // A request carries no outcome, so it is not a valid response
        let req = Request::new(Some(ObjectKey(1)), ClassType::Statement, ops::CLOSE, vec![]);
        let encoded = encode_request(&req).unwrap();

        let err = decode_message::<Response>(&encoded[4..]).unwrap_err();
        assert!(matches!(err, AgentError::MalformedMessage(_)));
    }
}
