use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Module path capability imports are declared against.
pub const API_MODULE: &str = "@clipsave/api";

static IMPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s*\{([^}]+)\}\s*from\s*['"]@clipsave/api['"][ \t]*;?[ \t]*(?:\r?\n)?"#)
        .expect("import declaration pattern")
});

/// Capabilities a script asked for, and its body with the declarations removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedImports {
    pub capabilities: BTreeSet<String>,
    pub sanitized: String,
}

impl ResolvedImports {
    pub fn requests(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }
}

pub fn resolve(source: &str) -> ResolvedImports {
    let mut capabilities = BTreeSet::new();
    for caps in IMPORT_DECL.captures_iter(source) {
        for name in caps[1].split(',').map(str::trim) {
            if !name.is_empty() {
                capabilities.insert(name.to_string());
            }
        }
    }

    let sanitized = IMPORT_DECL.replace_all(source, "").into_owned();
    ResolvedImports {
        capabilities,
        sanitized,
    }
}
