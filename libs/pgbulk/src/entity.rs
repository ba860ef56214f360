use std::fmt;

/// Origin tag of a composite identifier.
///
/// Discriminates which keyspace the identifier belongs to. Never persisted —
/// the bulk-load columns carry only the shard/record/child parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityTag(pub u8);

/// Composite identifier addressing a record across a sharded keyspace.
///
/// Parts, in order: origin tag (not persisted), shard, record, and up to two
/// child parts. The all-zero value is the distinguished EMPTY sentinel and
/// stands for "absent": an empty identifier is written as a wire-level null
/// for every one of its columns, never as zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityId {
    pub tag: EntityTag,
    pub shard: i16,
    pub record: i64,
    pub child: Option<i64>,
    pub grandchild: Option<i64>,
}

impl EntityId {
    pub const EMPTY: EntityId = EntityId {
        tag: EntityTag(0),
        shard: 0,
        record: 0,
        child: None,
        grandchild: None,
    };

    /// Two-part identifier: shard + record.
    pub fn pair(tag: EntityTag, shard: i16, record: i64) -> Self {
        EntityId {
            tag,
            shard,
            record,
            child: None,
            grandchild: None,
        }
    }

    /// Three-part identifier: shard + record + child.
    pub fn triple(tag: EntityTag, shard: i16, record: i64, child: i64) -> Self {
        EntityId {
            tag,
            shard,
            record,
            child: Some(child),
            grandchild: None,
        }
    }

    /// Four-part identifier: shard + record + child + grandchild.
    pub fn quad(tag: EntityTag, shard: i16, record: i64, child: i64, grandchild: i64) -> Self {
        EntityId {
            tag,
            shard,
            record,
            child: Some(child),
            grandchild: Some(grandchild),
        }
    }

    /// The absent-value test used by the per-part null checks.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tag.0, self.shard, self.record)?;
        if let Some(c) = self.child {
            write!(f, ":{c}")?;
        }
        if let Some(g) = self.grandchild {
            write!(f, ":{g}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(EntityId::default().is_empty());
        assert!(EntityId::EMPTY.is_empty());
    }

    #[test]
    fn populated_is_not_empty() {
        assert!(!EntityId::pair(EntityTag(1), 2, 100).is_empty());
        // A zero record under a nonzero shard is still a real identifier.
        assert!(!EntityId::pair(EntityTag(0), 3, 0).is_empty());
    }

    #[test]
    fn display_shows_all_parts() {
        let id = EntityId::quad(EntityTag(7), 1, 2, 3, 4);
        assert_eq!(id.to_string(), "7:1:2:3:4");
        assert_eq!(EntityId::pair(EntityTag(7), 1, 2).to_string(), "7:1:2");
    }
}
