use rand::{thread_rng, Rng};
use uuid::Uuid;

/// Length of the customer-facing order code.
pub const ORDER_CODE_LEN: usize = 8;

/// Uppercase alphanumerics only, so codes survive being read over the phone.
const ORDER_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fresh opaque identifier for any entity row.
pub fn new_entity_id() -> Uuid {
    Uuid::new_v4()
}

/// Generates a short customer-facing order code. Collisions are possible
/// (36^8 space) and are handled by the caller retrying against the unique
/// index on `orders.code`.
pub fn generate_order_code() -> String {
    let mut rng = thread_rng();
    (0..ORDER_CODE_LEN)
        .map(|_| ORDER_CODE_CHARSET[rng.gen_range(0..ORDER_CODE_CHARSET.len())] as char)
        .collect()
}
