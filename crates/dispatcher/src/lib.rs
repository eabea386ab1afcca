pub mod producer;

pub use producer::{default_fingerprint, priority_score, Producer};
