use pathwaygraph_model::{props, Entity, EntityKey, EntityKind, Graph, ReferrerIndex};
use proptest::prelude::*;

const MAX_NODES: usize = 24;

fn graph_strategy() -> impl Strategy<Value = Graph> {
    (1usize..=MAX_NODES)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec((0..n, 0..n, any::<bool>()), 0..(n * 3)),
            )
        })
        .prop_map(|(n, edges)| {
            let mut entities: Vec<Entity> = (0..n)
                .map(|i| Entity::new(format!("n{i}"), EntityKind::ProteinReference))
                .collect();
            for (from, to, as_member) in edges {
                let target = EntityKey::new(format!("n{to}"));
                if as_member {
                    entities[from].add_to(props::MEMBER_ENTITY_REFERENCE, target);
                } else {
                    entities[from].add_to(props::XREF, target);
                }
            }
            Graph::from_entities(entities).expect("keys are distinct")
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn index_agrees_with_a_full_scan(g in graph_strategy()) {
        let index = ReferrerIndex::build(&g);
        for target in g.keys() {
            let mut expected: Vec<(String, String)> = g
                .iter()
                .flat_map(|e| {
                    e.all_targets()
                        .filter(|(_, t)| *t == target)
                        .map(|(p, _)| (e.key().to_string(), p.to_string()))
                        .collect::<Vec<_>>()
                })
                .collect();
            expected.sort();
            let actual: Vec<(String, String)> = index
                .referrers_of(target)
                .map(|r| (r.key.to_string(), r.property.clone()))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }

    #[test]
    fn closure_is_closed(g in graph_strategy()) {
        let root = EntityKey::new("n0");
        let closure = g.closure(&root).expect("n0 always exists");
        prop_assert!(closure.dangling_references().is_empty());
        prop_assert!(closure.contains_key(&root));
    }
}
