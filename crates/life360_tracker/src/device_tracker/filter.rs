use serde::Deserialize;
use serde::Serialize;

/// Decides whether a circle or member, identified by name, is included.
pub trait InclusionFilter: Send + Sync {
    fn include(&self, name: &str) -> bool;
}

/// Includes everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl InclusionFilter for IncludeAll {
    fn include(&self, _name: &str) -> bool {
        true
    }
}

impl<F> InclusionFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn include(&self, name: &str) -> bool {
        self(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only the listed names are included
    #[default]
    Include,
    /// Everything but the listed names is included
    Exclude,
}

/// Include or exclude by name, ignoring case and surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameFilter {
    #[serde(default)]
    pub mode: FilterMode,

    #[serde(default)]
    pub names: Vec<String>,
}

impl NameFilter {
    fn listed(&self, name: &str) -> bool {
        let name = name.trim();
        self.names.iter().any(|n| n.trim().eq_ignore_ascii_case(name))
    }
}

impl InclusionFilter for NameFilter {
    fn include(&self, name: &str) -> bool {
        match self.mode {
            FilterMode::Include => self.listed(name),
            FilterMode::Exclude => !self.listed(name),
        }
    }
}

/// Build the filter for an optional config entry, including everything when unset.
pub fn filter_from_config(filter: Option<&NameFilter>) -> Box<dyn InclusionFilter> {
    match filter {
        Some(filter) => Box::new(filter.clone()),
        None => Box::new(IncludeAll),
    }
}
