//! ID generation utilities.

use uuid::Uuid;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new UUID v7-based ID.
    ///
    /// UUID v7 is time-ordered and is used for entity ids in federation
    /// documents and database primary keys alike.
    #[must_use]
    pub fn generate(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_v7() {
        let id_gen = IdGenerator::new();
        let id = id_gen.generate();

        assert_eq!(id.len(), 36); // UUID with hyphens
        assert!(id.starts_with('0')); // UUID v7 starts with version nibble
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let id_gen = IdGenerator::new();
        assert_ne!(id_gen.generate(), id_gen.generate());
    }
}
