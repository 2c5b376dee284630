//! User id generation strategies.

use uuid::Uuid;

use crate::IdGenerator;

/// Random 128-bit identifiers, hyphenated lowercase (`Uuid::new_v4`).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidV4Generator;

impl UuidV4Generator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidV4Generator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_parseable_distinct_ids() {
        let g = UuidV4Generator::new();
        let ids: HashSet<String> = (0..1000).map(|_| g.next_id()).collect();
        assert_eq!(ids.len(), 1000);
        for id in &ids {
            assert_eq!(id.len(), 36);
            assert!(Uuid::parse_str(id).is_ok());
        }
    }
}
