//! `LanguageRules`: a value type replacing the per-language chunker
//! subclass hierarchy the original system used (§9 REDESIGN FLAGS). One
//! generic tree walker (`super::walker`) is parameterized by one of these
//! per file; adding a language is a new table row, not a new `impl` block.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    ClassLike,
    FunctionLike,
    ImportLike,
    DecoratorWrapper,
    Other,
}

pub struct LanguageRules {
    pub class_kinds: &'static [&'static str],
    pub function_kinds: &'static [&'static str],
    pub import_kinds: &'static [&'static str],
    /// Node kind that wraps a decorated definition (Python's
    /// `decorated_definition`); empty when the language has no such wrapper.
    pub decorator_wrapper_kinds: &'static [&'static str],
    /// Field names tried, in order, to find a node's identifying name.
    pub name_fields: &'static [&'static str],
}

impl LanguageRules {
    pub fn classify(&self, kind: &str) -> NodeClass {
        if self.decorator_wrapper_kinds.contains(&kind) {
            NodeClass::DecoratorWrapper
        } else if self.class_kinds.contains(&kind) {
            NodeClass::ClassLike
        } else if self.function_kinds.contains(&kind) {
            NodeClass::FunctionLike
        } else if self.import_kinds.contains(&kind) {
            NodeClass::ImportLike
        } else {
            NodeClass::Other
        }
    }
}

const NAME_FIELDS_DEFAULT: &[&str] = &["name", "identifier", "declarator"];

/// Children node kinds scanned as a naming fallback when no configured
/// field yields a name (§4.2 "Naming").
pub const NAME_FALLBACK_KINDS: &[&str] = &[
    "identifier",
    "property_identifier",
    "type_identifier",
    "field_identifier",
    "scoped_identifier",
];

/// Convenience for callers outside the walker (the synchronizer's
/// classes/functions bookkeeping) that only need a yes/no answer keyed by a
/// raw tree-sitter node kind string, not the full walker traversal.
pub fn classify_chunk(language: &str, node_type: &str) -> (bool, bool) {
    match rules_for(language) {
        Some(rules) => match rules.classify(node_type) {
            NodeClass::ClassLike => (true, false),
            NodeClass::FunctionLike => (false, true),
            _ => (false, false),
        },
        None => (false, false),
    }
}

pub fn rules_for(tag: &str) -> Option<LanguageRules> {
    let r = match tag {
        "rust" => LanguageRules {
            class_kinds: &[
                "struct_item",
                "enum_item",
                "impl_item",
                "trait_item",
                "mod_item",
            ],
            function_kinds: &["function_item"],
            import_kinds: &["use_declaration"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "python" => LanguageRules {
            class_kinds: &["class_definition"],
            function_kinds: &["function_definition"],
            import_kinds: &["import_statement", "import_from_statement"],
            decorator_wrapper_kinds: &["decorated_definition"],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "typescript" | "javascript" => LanguageRules {
            class_kinds: &["class_declaration", "interface_declaration"],
            function_kinds: &[
                "function_declaration",
                "method_definition",
                "function_signature",
            ],
            import_kinds: &["import_statement"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "go" => LanguageRules {
            class_kinds: &["type_declaration"],
            function_kinds: &["function_declaration", "method_declaration"],
            import_kinds: &["import_declaration"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "java" => LanguageRules {
            class_kinds: &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
            ],
            function_kinds: &["method_declaration", "constructor_declaration"],
            import_kinds: &["import_declaration"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "csharp" => LanguageRules {
            class_kinds: &["class_declaration", "interface_declaration", "struct_declaration"],
            function_kinds: &["method_declaration", "constructor_declaration"],
            import_kinds: &["using_directive"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "php" => LanguageRules {
            class_kinds: &["class_declaration", "interface_declaration"],
            function_kinds: &["function_definition", "method_declaration"],
            import_kinds: &["namespace_use_declaration"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "proto" => LanguageRules {
            class_kinds: &["message", "service", "enum"],
            function_kinds: &["rpc"],
            import_kinds: &["import"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "c" => LanguageRules {
            class_kinds: &["struct_specifier", "enum_specifier", "union_specifier"],
            function_kinds: &["function_definition"],
            import_kinds: &["preproc_include"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "cpp" => LanguageRules {
            class_kinds: &["class_specifier", "struct_specifier", "namespace_definition"],
            function_kinds: &["function_definition"],
            import_kinds: &["preproc_include"],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        "ruby" => LanguageRules {
            class_kinds: &["class", "module"],
            function_kinds: &["method", "singleton_method"],
            import_kinds: &[],
            decorator_wrapper_kinds: &[],
            name_fields: NAME_FIELDS_DEFAULT,
        },
        _ => return None,
    };
    Some(r)
}
