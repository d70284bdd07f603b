//! UUID validation helper.
//!
//! Out of scope as a subsystem per spec.md §1 ("UUID validation helpers"),
//! but every durable operation in the KV Store Client and Order Record
//! Store validates `order_id`/field values against it, so it lives here as
//! a shared leaf function.

/// Returns `true` if `value` parses as an RFC 4122 UUID of any variant.
pub fn is_valid_uuid(value: &str) -> bool {
	uuid::Uuid::parse_str(value).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_well_formed_uuid() {
		assert!(is_valid_uuid("11111111-1111-1111-1111-111111111111"));
	}

	#[test]
	fn rejects_garbage() {
		assert!(!is_valid_uuid("not-a-uuid"));
		assert!(!is_valid_uuid(""));
		assert!(!is_valid_uuid("11111111-1111-1111-1111"));
	}
}
