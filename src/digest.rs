//! Payload fingerprinting
//!
//! A digest is the deterministic fingerprint of a CRM payload. Two payloads
//! that differ only in map key insertion order must fingerprint identically,
//! so the default strategy serializes a canonical form (object keys sorted
//! bytewise, arrays kept in order) and hashes it with SHA-256.

use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// A CRM payload: string keys mapped to JSON-serializable values.
pub type Payload = serde_json::Map<String, Value>;

/// Strategy for fingerprinting a payload.
///
/// Implementations must be pure: the same payload always produces the same
/// digest, regardless of process, thread or insertion order.
pub trait DigestStrategy: Send + Sync {
	fn digest(&self, payload: &Payload) -> String;
}

/// Default strategy: SHA-256 over canonical JSON, lowercase hex output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256CanonicalJson;

impl DigestStrategy for Sha256CanonicalJson {
	fn digest(&self, payload: &Payload) -> String {
		let mut canonical = String::new();
		write_canonical_map(&mut canonical, payload);

		let mut hasher = Sha256::new();
		hasher.update(canonical.as_bytes());
		hex::encode(hasher.finalize())
	}
}

fn write_canonical_map(out: &mut String, map: &Payload) {
	let mut keys: Vec<&String> = map.keys().collect();
	keys.sort_unstable();

	out.push('{');
	for (i, key) in keys.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		// serde_json renders the key with JSON string escaping
		out.push_str(&Value::String((*key).clone()).to_string());
		out.push(':');
		write_canonical_value(out, &map[key.as_str()]);
	}
	out.push('}');
}

fn write_canonical_value(out: &mut String, value: &Value) {
	match value {
		Value::Object(map) => write_canonical_map(out, map),
		Value::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical_value(out, item);
			}
			out.push(']');
		}
		// Scalars already serialize deterministically
		_ => out.push_str(&value.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn payload_of(value: Value) -> Payload {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected object"),
		}
	}

	#[test]
	fn key_order_does_not_matter() {
		let a = payload_of(json!({"email": "a@b", "name": "Ada", "age": 36}));
		let mut b = Payload::new();
		b.insert("age".into(), json!(36));
		b.insert("name".into(), json!("Ada"));
		b.insert("email".into(), json!("a@b"));

		let strategy = Sha256CanonicalJson;
		assert_eq!(strategy.digest(&a), strategy.digest(&b));
	}

	#[test]
	fn nested_maps_and_arrays_are_traversed() {
		let a = payload_of(json!({
			"tags": ["x", "y"],
			"address": {"city": "Berlin", "zip": "10115"},
		}));
		let b = payload_of(json!({
			"address": {"zip": "10115", "city": "Berlin"},
			"tags": ["x", "y"],
		}));
		let c = payload_of(json!({
			"address": {"zip": "10115", "city": "Berlin"},
			"tags": ["y", "x"],
		}));

		let strategy = Sha256CanonicalJson;
		assert_eq!(strategy.digest(&a), strategy.digest(&b));
		// Array order is significant
		assert_ne!(strategy.digest(&a), strategy.digest(&c));
	}

	#[test]
	fn value_types_are_preserved() {
		let as_number = payload_of(json!({"count": 1}));
		let as_string = payload_of(json!({"count": "1"}));
		let as_bool = payload_of(json!({"count": true}));

		let strategy = Sha256CanonicalJson;
		assert_ne!(strategy.digest(&as_number), strategy.digest(&as_string));
		assert_ne!(strategy.digest(&as_number), strategy.digest(&as_bool));
	}

	#[test]
	fn digest_is_stable_across_calls() {
		let payload = payload_of(json!({"email": "a@b", "active": false, "score": 1.5}));
		let strategy = Sha256CanonicalJson;
		assert_eq!(strategy.digest(&payload), strategy.digest(&payload));
	}
}
