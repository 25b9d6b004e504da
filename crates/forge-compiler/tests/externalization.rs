//! Shared modules stay external and outputs stay deterministic

use forge_artifact::{ContentHash, ModuleFormat, ModuleHeader};
use forge_compiler::{compile, CompileError, CompileOptions, CompilePool};
use forge_registry::{SharedModuleEntry, SharedRegistry};
use forge_repair::{repair, RepairOptions};
use proptest::prelude::*;
use std::sync::Arc;

/// A stand-in for the React build, with a string only its own source contains
const REACT_MARKER: &str = "__SECRET_INTERNALS_DO_NOT_USE";

fn registry() -> SharedRegistry {
    let registry = SharedRegistry::new();
    registry.register_entry(
        SharedModuleEntry::new("react", "18.3.1", Arc::new(()))
            .with_marker(REACT_MARKER),
    );
    registry.register_entry(SharedModuleEntry::new("remotion", "4.0.0", Arc::new(())));
    registry
}

const COUNTER: &str = r#"import { useState } from "react";

export default function Counter() {
  const [n, setN] = useState<number>(0);
  return <button onClick={() => setN(n + 1)}>Clicked {n} times</button>;
}
"#;

const TITLE: &str = r#"import React from "react";
import { useCurrentFrame } from "remotion";

type Props = { title: string };

export default function Title({ title }: Props) {
  const frame = useCurrentFrame();
  return <h1 style={{ opacity: Math.min(1, frame / 30) }}>{title}</h1>;
}
"#;

#[test]
fn distinct_bundles_share_no_library_code() {
    let options = CompileOptions::from_registry(&registry());

    let a = compile(COUNTER, &options).unwrap();
    let b = compile(TITLE, &options).unwrap();

    assert_ne!(ContentHash::of(&a.bytes), ContentHash::of(&b.bytes));
    for module in [&a, &b] {
        assert!(!module.text().contains(REACT_MARKER));
        assert!(module.external_names_used.contains("react"));
        assert!(!module.text().contains("from \"react\""));
    }
    assert!(b.external_names_used.contains("remotion"));
    assert!(!a.external_names_used.contains("remotion"));
}

#[test]
fn header_lists_used_externals() {
    let options = CompileOptions::from_registry(&registry());
    let module = compile(TITLE, &options).unwrap();

    let header = ModuleHeader::parse(module.text()).unwrap();
    assert_eq!(header.format, ModuleFormat::Module);
    assert_eq!(header.externals, module.external_names_used);
}

#[test]
fn unregistered_import_is_rejected() {
    let options = CompileOptions::from_registry(&registry());
    let source = "import { motion } from \"framer-motion\";\nexport default () => <motion.div />;\n";
    assert_eq!(
        compile(source, &options).unwrap_err(),
        CompileError::UnresolvedImport {
            specifier: "framer-motion".into()
        }
    );
}

#[test]
fn escaped_markup_renders_literally() {
    let source = "export default function Clip() {\n  return <p>Example: \"<svg></svg>\"</p>;\n}\n";
    let repaired = repair(source, &RepairOptions::default());
    assert!(!repaired.still_invalid);

    let options = CompileOptions::default().with_external("react");
    let module = compile(&repaired.repaired_text, &options).unwrap();
    assert!(
        module.text().contains(r#""Example: \"<svg></svg>\"""#),
        "{}",
        module.text()
    );
}

#[test]
fn repaired_legacy_source_compiles_to_global_slot() {
    let source = "export default function Clip() { return <i>legacy</i>; }\n";
    let repaired = repair(source, &RepairOptions::global_slot("default", "job-7"));

    let options = CompileOptions::default()
        .with_external("react")
        .with_format(ModuleFormat::GlobalSlot)
        .with_slot_key("job-7");
    let module = compile(&repaired.repaired_text, &options).unwrap();
    let text = module.text();

    assert!(text.contains("(function () {"));
    assert!(!text.contains("export "));
    assert!(text.contains("[\"job-7\"] = Clip;"));
}

#[tokio::test]
async fn pool_compiles_concurrently() {
    let pool = CompilePool::new(2).unwrap();
    let options = CompileOptions::from_registry(&registry());

    let jobs = (0..8).map(|i| {
        let source = format!("export default function C{i}() {{ return <b>{i}</b>; }}\n");
        pool.compile(source, options.clone())
    });
    let results = futures::future::join_all(jobs).await;

    assert!(results.iter().all(Result::is_ok));
    let stats = pool.stats();
    assert_eq!(stats.completed, 8);
    assert_eq!(stats.failed, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn compile_is_deterministic(label in "[A-Za-z ]{1,24}", count in 0u32..1000) {
        let source = format!(
            "import {{ useState }} from \"react\";\nexport default function Clip() {{\n  const [n] = useState({count});\n  return <p title=\"{label}\">{label} {{n}}</p>;\n}}\n"
        );
        let options = CompileOptions::from_registry(&registry());

        let first = compile(&source, &options).unwrap();
        let second = compile(&source, &options).unwrap();
        prop_assert_eq!(&first.bytes, &second.bytes);
        prop_assert!(!first.text().contains(REACT_MARKER));
        prop_assert!(!first.text().contains("import "));
    }
}
