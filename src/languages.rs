//! Language configuration for compilation and execution

use std::collections::HashMap;
use std::fmt;
use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Languages the engine can execute and analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
    ];

    /// Canonical key used in languages.toml and on the wire
    pub fn key(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub language: Language,
    /// Name of the source file (e.g., "main.cpp")
    pub source_file: String,
    /// Compile command template (None if not needed)
    pub compile_command: Option<Vec<String>>,
    /// Run command template
    pub run_command: Vec<String>,
    /// Time limit multiplier and bonus: (multiplier, bonus_seconds)
    /// actual_time = base_time * multiplier + bonus
    pub time_limit: Option<(u32, u32)>,
    /// Whether the address-space rlimit is applied to runs.
    /// JVM and V8 reserve more virtual memory than they use and cap their heap
    /// through flags in `run_command` instead.
    pub enforce_memory_limit: bool,
}

impl LanguageConfig {
    /// Calculate actual time limit based on base time limit
    /// base_time_ms: base time limit in milliseconds (from problem)
    /// Returns: adjusted time limit in milliseconds
    pub fn calculate_time_limit(&self, base_time_ms: u32) -> u32 {
        match self.time_limit {
            Some((multiplier, bonus_seconds)) => base_time_ms
                .saturating_mul(multiplier)
                .saturating_add(bonus_seconds.saturating_mul(1000)),
            None => base_time_ms,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compile_command.is_some()
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default)]
    time_limit: Vec<String>,
    #[serde(default = "default_enforce_memory_limit")]
    enforce_memory_limit: bool,
    #[serde(default)]
    aliases: Vec<String>,
}

fn default_enforce_memory_limit() -> bool {
    true
}

/// Language configurations keyed by `Language`, with alias resolution
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
    aliases: HashMap<String, Language>,
}

impl LanguageRegistry {
    /// Registry built from the languages.toml embedded at build time
    pub fn embedded() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
        Self::from_toml(content)
    }

    /// Load from `path` when given, the embedded file otherwise
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read language config: {}", path))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Invalid language config: {}", path))
            }
            None => Self::embedded(),
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut configs = HashMap::new();
        let mut aliases = HashMap::new();

        for (name, raw) in raw_configs {
            let language = Language::from_key(&name)
                .with_context(|| format!("Unknown language section: [{}]", name))?;

            let time_limit = if raw.time_limit.is_empty() {
                None
            } else {
                if raw.time_limit.len() != 2 {
                    anyhow::bail!("Invalid time limit for {}: {:?}", name, raw.time_limit);
                }
                let multiplier = raw.time_limit[0].parse::<u32>().with_context(|| {
                    format!("Invalid time multiplier for {}: {}", name, raw.time_limit[0])
                })?;
                let bonus = raw.time_limit[1].parse::<u32>().with_context(|| {
                    format!("Invalid time offset for {}: {}", name, raw.time_limit[1])
                })?;
                Some((multiplier, bonus))
            };

            let run_command = into_command(&raw.run_command);
            if run_command.is_empty() {
                anyhow::bail!("Empty run command for {}", name);
            }

            configs.insert(
                language,
                LanguageConfig {
                    language,
                    source_file: raw.source_file,
                    compile_command: raw
                        .compile_command
                        .map(|cmd| into_command(&cmd))
                        .filter(|cmd| !cmd.is_empty()),
                    run_command,
                    time_limit,
                    enforce_memory_limit: raw.enforce_memory_limit,
                },
            );

            aliases.insert(language.key().to_string(), language);
            for alias in raw.aliases {
                aliases.insert(alias.to_lowercase(), language);
            }
        }

        Ok(Self { configs, aliases })
    }

    /// Resolve a client-supplied language name or alias
    pub fn resolve(&self, name: &str) -> Option<Language> {
        self.aliases.get(&name.trim().to_lowercase()).copied()
    }

    pub fn config(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    /// Get all configured languages
    pub fn supported(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.configs.keys().copied().collect();
        languages.sort();
        languages
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}
