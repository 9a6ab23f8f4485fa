use rmp_serde::{decode, encode};
use serde_json;
use thiserror::Error;

use crate::{Intent, Rejection, UpdateRecord};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_intent(intent: &Intent) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(intent)?)
}

pub fn deserialize_intent(bytes: &[u8]) -> Result<Intent, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_updates(updates: &[UpdateRecord]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(updates)?)
}

pub fn deserialize_updates(bytes: &[u8]) -> Result<Vec<UpdateRecord>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_rejection(rejection: &Rejection) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(rejection)?)
}

pub fn deserialize_rejection(bytes: &[u8]) -> Result<Rejection, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_intent_json(intent: &Intent) -> Result<String, WireError> {
    Ok(serde_json::to_string(intent)?)
}

pub fn deserialize_intent_json(json: &str) -> Result<Intent, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_updates_json(updates: &[UpdateRecord]) -> Result<String, WireError> {
    Ok(serde_json::to_string(updates)?)
}

pub fn deserialize_updates_json(json: &str) -> Result<Vec<UpdateRecord>, WireError> {
    Ok(serde_json::from_str(json)?)
}
