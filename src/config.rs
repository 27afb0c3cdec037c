use crate::error::{Result, RunfoError};

pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
pub const DEFAULT_ORGANIZATION: &str = "dnceng";
pub const DEFAULT_PROJECT: &str = "public";
pub const DEFAULT_BUILD_COUNT: usize = 5;

/// Named build definitions that can be referred to by name on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildDefinition {
    pub name: &'static str,
    pub id: i32,
}

pub const BUILD_DEFINITIONS: [BuildDefinition; 7] = [
    BuildDefinition {
        name: "runtime",
        id: 686,
    },
    BuildDefinition {
        name: "coreclr",
        id: 655,
    },
    BuildDefinition {
        name: "libraries",
        id: 675,
    },
    BuildDefinition {
        name: "libraries windows",
        id: 676,
    },
    BuildDefinition {
        name: "libraries linux",
        id: 677,
    },
    BuildDefinition {
        name: "libraries osx",
        id: 678,
    },
    BuildDefinition {
        name: "crossgen2",
        id: 701,
    },
];

/// Resolves a definition given either as a numeric id or as a known name.
pub fn resolve_definition_id(definition: &str) -> Result<i32> {
    if let Ok(id) = definition.trim().parse::<i32>() {
        return Ok(id);
    }

    BUILD_DEFINITIONS
        .iter()
        .find(|d| d.name == definition)
        .map(|d| d.id)
        .ok_or_else(|| {
            RunfoError::Usage(format!(
                "{definition} is not a valid definition name or id"
            ))
        })
}

/// Table of supported definition names, printed alongside definition usage errors.
pub fn supported_definitions_help() -> String {
    let mut text = String::from("Supported definition names\n");
    for definition in &BUILD_DEFINITIONS {
        text.push_str(&format!("{}\t{}\n", definition.id, definition.name));
    }
    text
}
