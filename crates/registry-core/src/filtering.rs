//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Server filtering
//!
//! Filters prune a canonical registry by server name globs and exact tag
//! membership. Both server maps are treated uniformly; registry metadata and
//! groups pass through untouched. Filtering is pure and idempotent.

use glob::Pattern;

use crate::error::{RegistryError, RegistryResult};
use crate::types::{BaseServer, Registry};
use crate::v1alpha1::{NameFilter, RegistryFilter, TagFilter};

/// Apply a filter specification to a registry, producing a pruned copy
pub fn apply_filters(registry: &Registry, filter: &RegistryFilter) -> RegistryResult<Registry> {
    let name_matcher = NameMatcher::compile(filter.name_filters.as_ref())?;
    let tag_filter = filter.tags.as_ref();

    let mut result = Registry {
        version: registry.version.clone(),
        last_updated: registry.last_updated.clone(),
        groups: registry.groups.clone(),
        ..Default::default()
    };

    for (name, server) in &registry.servers {
        if retain(name, &server.base, &name_matcher, tag_filter) {
            result.servers.insert(name.clone(), server.clone());
        }
    }

    for (name, server) in &registry.remote_servers {
        if retain(name, &server.base, &name_matcher, tag_filter) {
            result.remote_servers.insert(name.clone(), server.clone());
        }
    }

    Ok(result)
}

fn retain(
    name: &str,
    base: &BaseServer,
    names: &NameMatcher,
    tags: Option<&TagFilter>,
) -> bool {
    names.matches(name) && tags.map(|t| matches_tags(&base.tags, t)).unwrap_or(true)
}

/// Compiled name glob patterns
struct NameMatcher {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl NameMatcher {
    fn compile(filter: Option<&NameFilter>) -> RegistryResult<Self> {
        let (include, exclude) = match filter {
            Some(f) => (
                compile_patterns(&f.include)?,
                compile_patterns(&f.exclude)?,
            ),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Self { include, exclude })
    }

    /// Full-string, case-sensitive glob matching
    fn matches(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(name)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(name))
    }
}

fn compile_patterns(patterns: &[String]) -> RegistryResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| RegistryError::InvalidPattern {
                pattern: p.clone(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

/// Exact, case-sensitive tag membership
fn matches_tags(tags: &[String], filter: &TagFilter) -> bool {
    if !filter.include.is_empty()
        && !filter.include.iter().all(|t| tags.contains(t))
    {
        return false;
    }
    !filter.exclude.iter().any(|t| tags.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageServer, RemoteServer, Transport};

    fn image_server(name: &str, tags: &[&str]) -> ImageServer {
        ImageServer {
            base: BaseServer {
                name: name.to_string(),
                description: format!("{} server", name),
                transport: Transport::Stdio,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            image: format!("mcp/{}:latest", name),
            ..Default::default()
        }
    }

    fn remote_server(name: &str, tags: &[&str]) -> RemoteServer {
        RemoteServer {
            base: BaseServer {
                name: name.to_string(),
                description: format!("{} service", name),
                transport: Transport::Sse,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            url: format!("https://{}.example.com/mcp", name),
        }
    }

    /// Registry exercising the common filtering scenarios: production and
    /// experimental image servers plus production and deprecated remotes.
    fn test_registry() -> Registry {
        let mut registry = Registry {
            version: "1.0.0".to_string(),
            last_updated: Some("2024-01-15T10:00:00Z".to_string()),
            ..Default::default()
        };
        registry.servers.insert(
            "filesystem".to_string(),
            image_server("filesystem", &["filesystem", "production", "stable"]),
        );
        registry.servers.insert(
            "weather-experimental".to_string(),
            image_server("weather-experimental", &["weather", "experimental", "beta"]),
        );
        registry.servers.insert(
            "database".to_string(),
            image_server("database", &["database", "production", "sql"]),
        );
        registry.servers.insert(
            "legacy-tools".to_string(),
            image_server("legacy-tools", &["tools", "deprecated", "legacy"]),
        );
        registry.remote_servers.insert(
            "api-gateway".to_string(),
            remote_server("api-gateway", &["api", "production", "gateway"]),
        );
        registry.remote_servers.insert(
            "old-service".to_string(),
            remote_server("old-service", &["legacy", "deprecated", "remote"]),
        );
        registry
    }

    #[test]
    fn test_empty_filter_returns_input_unchanged() {
        let registry = test_registry();
        let result = apply_filters(&registry, &RegistryFilter::default()).unwrap();
        assert_eq!(result, registry);
    }

    #[test]
    fn test_production_only_tag_filter() {
        let filter = RegistryFilter {
            tags: Some(TagFilter {
                include: vec!["production".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.servers.len(), 2);
        assert!(result.servers.contains_key("filesystem"));
        assert!(result.servers.contains_key("database"));
        assert_eq!(result.remote_servers.len(), 1);
        assert!(result.remote_servers.contains_key("api-gateway"));
    }

    #[test]
    fn test_exclude_experimental_and_deprecated() {
        let filter = RegistryFilter {
            tags: Some(TagFilter {
                exclude: vec!["experimental".to_string(), "deprecated".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.servers.len(), 2);
        assert!(!result.servers.contains_key("weather-experimental"));
        assert!(!result.servers.contains_key("legacy-tools"));
        assert_eq!(result.remote_servers.len(), 1);
        assert!(!result.remote_servers.contains_key("old-service"));
    }

    #[test]
    fn test_name_globs_combined_with_tag_exclude() {
        // legacy-tools matches *-tools but carries the deprecated tag
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["*-tools".to_string(), "weather-*".to_string()],
                ..Default::default()
            }),
            tags: Some(TagFilter {
                exclude: vec!["deprecated".to_string()],
                ..Default::default()
            }),
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.servers.len(), 1);
        assert!(result.servers.contains_key("weather-experimental"));
        assert!(result.remote_servers.is_empty());
    }

    #[test]
    fn test_combined_include_exclude_across_axes() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["*api*".to_string(), "database".to_string()],
                exclude: vec!["*legacy*".to_string()],
            }),
            tags: Some(TagFilter {
                include: vec![],
                ..Default::default()
            }),
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.servers.len(), 1);
        assert!(result.servers.contains_key("database"));
        assert_eq!(result.remote_servers.len(), 1);
        assert!(result.remote_servers.contains_key("api-gateway"));
    }

    #[test]
    fn test_tag_include_is_conjunction() {
        let filter = RegistryFilter {
            tags: Some(TagFilter {
                include: vec!["production".to_string(), "sql".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.servers.len(), 1);
        assert!(result.servers.contains_key("database"));
        assert!(result.remote_servers.is_empty());
    }

    #[test]
    fn test_tag_matching_is_case_sensitive() {
        let filter = RegistryFilter {
            tags: Some(TagFilter {
                include: vec!["Production".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert_eq!(result.server_count(), 0);
    }

    #[test]
    fn test_glob_matches_full_string() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["database".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        // "data" alone must not match "database"
        let narrow = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["data".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let registry = test_registry();
        assert_eq!(apply_filters(&registry, &filter).unwrap().servers.len(), 1);
        assert_eq!(apply_filters(&registry, &narrow).unwrap().server_count(), 0);
    }

    #[test]
    fn test_question_mark_matches_single_character() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["databas?".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = apply_filters(&test_registry(), &filter).unwrap();
        assert!(result.servers.contains_key("database"));
    }

    #[test]
    fn test_no_matching_servers_preserves_metadata() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["nonexistent-*".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let registry = test_registry();
        let result = apply_filters(&registry, &filter).unwrap();
        assert_eq!(result.server_count(), 0);
        assert_eq!(result.version, registry.version);
        assert_eq!(result.last_updated, registry.last_updated);
        assert_eq!(result.groups, registry.groups);
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["[unclosed".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = apply_filters(&test_registry(), &filter).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let filter = RegistryFilter {
            name_filters: Some(NameFilter {
                include: vec!["*".to_string()],
                exclude: vec!["legacy-*".to_string()],
            }),
            tags: Some(TagFilter {
                include: vec!["production".to_string()],
                exclude: vec!["deprecated".to_string()],
            }),
        };

        let once = apply_filters(&test_registry(), &filter).unwrap();
        let twice = apply_filters(&once, &filter).unwrap();
        assert_eq!(once, twice);
    }
}
