//! Property-based tests for catalog views and selection resolution

use super::catalog::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_kind() -> impl Strategy<Value = ToolKind> {
    prop_oneof![
        Just(ToolKind::Builtin),
        Just(ToolKind::Custom),
        ("[a-c]", "[A-Z][a-z]{2,6}").prop_map(|(server_id, server_name)| ToolKind::Mcp {
            server_id,
            server_name,
        }),
    ]
}

fn arb_tool() -> impl Strategy<Value = Tool> {
    ("t[0-9]{1,2}", "[a-z ]{1,12}", arb_kind(), any::<bool>(), any::<bool>()).prop_map(
        |(id, name, kind, enabled, is_default)| Tool {
            id,
            name,
            description: None,
            kind,
            enabled,
            is_default,
        },
    )
}

fn arb_catalog() -> impl Strategy<Value = ToolCatalog> {
    proptest::collection::vec(arb_tool(), 0..20).prop_map(ToolCatalog::new)
}

fn id_set(tools: &[&Tool]) -> HashSet<String> {
    tools.iter().map(|t| t.id.clone()).collect()
}

proptest! {
    #[test]
    fn kind_views_partition_the_catalog(catalog in arb_catalog()) {
        let builtin = id_set(&catalog.builtin_tools());
        let custom = id_set(&catalog.custom_tools());
        let mcp = id_set(&catalog.mcp_tools());

        prop_assert!(builtin.is_disjoint(&custom));
        prop_assert!(builtin.is_disjoint(&mcp));
        prop_assert!(custom.is_disjoint(&mcp));
        prop_assert_eq!(builtin.len() + custom.len() + mcp.len(), catalog.len());

        for tool in catalog.tools() {
            let memberships = [&builtin, &custom, &mcp]
                .iter()
                .filter(|view| view.contains(&tool.id))
                .count();
            prop_assert_eq!(memberships, 1);
        }
    }

    #[test]
    fn defaults_are_always_enabled(catalog in arb_catalog()) {
        let defaults = id_set(&catalog.default_tools());
        let enabled = id_set(&catalog.enabled_tools());
        prop_assert!(defaults.is_subset(&enabled));
    }

    #[test]
    fn mcp_servers_cover_mcp_view(catalog in arb_catalog()) {
        let grouped: usize = catalog.mcp_servers().values().map(|s| s.tools.len()).sum();
        prop_assert_eq!(grouped, catalog.mcp_tools().len());
    }

    #[test]
    fn resolve_is_duplicate_free_and_known(
        catalog in arb_catalog(),
        requested in proptest::collection::vec("t[0-9]{1,2}", 0..15),
    ) {
        let resolved = catalog.resolve(&requested, true);
        let unique: HashSet<_> = resolved.iter().collect();
        prop_assert_eq!(unique.len(), resolved.len());
        for id in &resolved {
            prop_assert!(catalog.contains(id));
            prop_assert!(requested.contains(id));
        }
    }
}
