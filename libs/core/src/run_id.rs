use std::sync::Arc;

use rand::RngCore;

const RUN_ID_BYTES: usize = 8;

/// Source of run ids correlating a plan with its report.
pub trait RunIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

pub type SharedRunIdGenerator = Arc<dyn RunIdGenerator>;

/// 16 lowercase hex characters from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRunIdGenerator;

impl RunIdGenerator for RandomRunIdGenerator {
    fn generate(&self) -> String {
        let mut buf = [0u8; RUN_ID_BYTES];
        rand::rng().fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_hex_and_distinct() {
        let a = RandomRunIdGenerator.generate();
        let b = RandomRunIdGenerator.generate();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }
}
