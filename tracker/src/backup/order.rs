//! Fixed dependency orderings over all entity types.

use crate::database::schema::Identity;
use crate::database::EntityKind;

const ENTITY_COUNT: usize = EntityKind::ALL.len();

/// Referenced types before their dependents; junctions last.
pub const RECREATION_ORDER: [EntityKind; ENTITY_COUNT] = EntityKind::ALL;

/// Exact reverse of [`RECREATION_ORDER`]; junctions first.
pub const DELETION_ORDER: [EntityKind; ENTITY_COUNT] = reversed(RECREATION_ORDER);

const fn reversed(order: [EntityKind; ENTITY_COUNT]) -> [EntityKind; ENTITY_COUNT] {
    let mut out = order;
    let mut i = 0;
    while i < ENTITY_COUNT {
        out[i] = order[ENTITY_COUNT - 1 - i];
        i += 1;
    }
    out
}

/// Relationship spot checks run after recreation: (parent, child, child fk)
pub const SPOT_CHECKS: [(EntityKind, EntityKind, &str); 3] = [
    (EntityKind::User, EntityKind::UserDevice, "user_id"),
    (EntityKind::Workflow, EntityKind::WorkflowStep, "workflow_id"),
    (EntityKind::Project, EntityKind::Milestone, "project_id"),
];

/// Junction types in deletion order
pub fn junctions() -> impl Iterator<Item = EntityKind> {
    DELETION_ORDER
        .into_iter()
        .filter(|kind| matches!(kind.def().identity, Identity::Compound { .. }))
}

/// Top-level artifact collections; embedded children travel inside parents
pub fn snapshot_collections() -> impl Iterator<Item = EntityKind> {
    RECREATION_ORDER
        .into_iter()
        .filter(|kind| !kind.def().is_embedded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn positions(order: &[EntityKind]) -> HashMap<EntityKind, usize> {
        order.iter().enumerate().map(|(i, k)| (*k, i)).collect()
    }

    #[test]
    fn test_recreation_order_respects_non_deferred_references() {
        let position = positions(&RECREATION_ORDER);
        for kind in RECREATION_ORDER {
            for (field, reference) in kind.def().references() {
                if reference.deferred {
                    continue;
                }
                assert!(
                    position[&reference.target] < position[&kind],
                    "{}.{} references {} which is recreated later",
                    kind,
                    field.name,
                    reference.target
                );
            }
        }
    }

    #[test]
    fn test_deletion_order_is_exact_reverse() {
        let mut reversed = DELETION_ORDER.to_vec();
        reversed.reverse();
        assert_eq!(reversed, RECREATION_ORDER.to_vec());
    }

    #[test]
    fn test_junctions_are_deleted_first() {
        let junction_count = junctions().count();
        assert_eq!(junction_count, 7);
        assert!(DELETION_ORDER[..junction_count]
            .iter()
            .all(|kind| kind.def().is_junction()));
    }

    #[test]
    fn test_every_type_appears_once() {
        assert_eq!(positions(&RECREATION_ORDER).len(), ENTITY_COUNT);
    }

    #[test]
    fn test_snapshot_collections_skip_embedded_children() {
        let collections: Vec<_> = snapshot_collections().collect();
        assert!(!collections.contains(&EntityKind::UserDevice));
        assert!(!collections.contains(&EntityKind::WorkflowStep));
        assert!(collections.contains(&EntityKind::User));
        assert_eq!(collections.len(), ENTITY_COUNT - 2);
    }

    #[test]
    fn test_spot_check_foreign_keys_exist() {
        for (parent, child, fk) in SPOT_CHECKS {
            let field = child.def().field(fk).expect("spot check fk defined");
            assert_eq!(field.reference.map(|r| r.target), Some(parent));
        }
    }
}
