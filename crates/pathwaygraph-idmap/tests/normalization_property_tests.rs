use pathwaygraph_idmap::normalize::{canonical_namespace, normalize_pair};
use pathwaygraph_idmap::{IdMappingTable, Mapping, MappingTable};
use pathwaygraph_model::MappingDomain;
use proptest::prelude::*;

fn namespace_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("uniprot".to_string()),
        Just("UniProt Knowledgebase".to_string()),
        Just("SwissProt".to_string()),
        Just("RefSeq".to_string()),
        Just("kegg genes".to_string()),
        Just("pubchem-compound".to_string()),
        Just("PubChem-substance".to_string()),
        Just("ChEBI".to_string()),
        "[a-zA-Z][a-zA-Z ._-]{0,12}",
    ]
}

fn id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z][0-9][A-Z0-9]{3}[0-9](-[0-9]{1,2}){0,2}",
        "NP_[0-9]{4,9}(\\.[0-9]){0,2}",
        "[a-z]{3}:[0-9]{1,6}",
        "(SID:|CID:|sid:)?[0-9]{1,8}",
        "[A-Za-z0-9:._-]{1,20}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn normalization_is_idempotent(ns in namespace_strategy(), id in id_strategy()) {
        if let Some((ns1, id1)) = normalize_pair(&ns, &id) {
            let (ns2, id2) = normalize_pair(&ns1, &id1).expect("normalized pair stays non-blank");
            prop_assert_eq!(&ns1, &ns2);
            prop_assert_eq!(&id1, &id2);
            prop_assert_eq!(canonical_namespace(&ns1), ns1);
        }
    }

    #[test]
    fn lookups_are_deterministic(ns in namespace_strategy(), id in id_strategy()) {
        let mut table = IdMappingTable::new();
        if let Ok(m) = Mapping::new(MappingDomain::Gene, &ns, &id, "UNIPROT", "P00001") {
            table.insert(m);
        }
        let first = table.lookup(&ns, &id, MappingDomain::Gene).unwrap();
        let second = table.lookup(&ns, &id, MappingDomain::Gene).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn stored_records_are_found_by_raw_query(ns in namespace_strategy(), id in id_strategy()) {
        if let Ok(m) = Mapping::new(MappingDomain::Chemical, &ns, &id, "CHEBI", "CHEBI:15377") {
            let table: IdMappingTable = std::iter::once(m).collect();
            let hit = table.lookup(&ns, &id, MappingDomain::Chemical).unwrap();
            prop_assert_eq!(hit.map(|h| h.id), Some("CHEBI:15377".to_string()));
            prop_assert!(table.lookup(&ns, &id, MappingDomain::Gene).unwrap().is_none());
        }
    }
}
