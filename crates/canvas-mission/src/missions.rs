use canvas_core::{Path, PathError};
use thiserror::Error;

use crate::config::MissionConfig;
use crate::patterns;

/// A flyable pattern. Missions only plan; `MissionRunner` flies the plan.
pub trait Mission: Send + Sync {
    fn name(&self) -> &'static str;
    fn describe(&self) -> &'static str;
    fn plan(&self, cfg: &MissionConfig) -> Result<Path, PathError>;
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("unknown mission {name:?} (available: {available})")]
    Unknown { name: String, available: String },
}

struct Pattern {
    name: &'static str,
    describe: &'static str,
    plan: fn(&MissionConfig) -> Result<Path, PathError>,
}

impl Mission for Pattern {
    fn name(&self) -> &'static str {
        self.name
    }

    fn describe(&self) -> &'static str {
        self.describe
    }

    fn plan(&self, cfg: &MissionConfig) -> Result<Path, PathError> {
        (self.plan)(cfg)
    }
}

/// Built-in missions in listing order.
pub fn registry() -> Vec<Box<dyn Mission>> {
    vec![
        Box::new(Pattern { name: "hop", describe: "climb, light one point, land", plan: patterns::hop }),
        Box::new(Pattern { name: "square", describe: "closed square stroke in the North-Down plane", plan: patterns::square }),
        Box::new(Pattern { name: "dashed", describe: "square with each side a separate stroke", plan: patterns::dashed_square }),
        Box::new(Pattern { name: "spiral", describe: "rising rainbow helix", plan: patterns::spiral }),
        Box::new(Pattern { name: "smiley", describe: "face, eyes and smile, one stroke each", plan: patterns::smiley }),
    ]
}

pub fn find(name: &str) -> Result<Box<dyn Mission>, RegistryError> {
    let all = registry();
    let available = all.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ");
    all.into_iter()
        .find(|m| m.name() == name)
        .ok_or(RegistryError::Unknown { name: name.to_string(), available })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_plans_a_valid_path() {
        let cfg = MissionConfig::default();
        for m in registry() {
            let path = m.plan(&cfg).unwrap();
            assert!(!path.is_empty(), "{} planned nothing", m.name());
        }
    }

    #[test]
    fn unknown_name_lists_what_exists() {
        let err = find("frowny").err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("frowny"));
        assert!(msg.contains("hop, square, dashed, spiral, smiley"));
        assert_eq!(find("spiral").unwrap().name(), "spiral");
    }

    #[test]
    fn smiley_is_registered_with_a_lift_between_features() {
        let path = find("smiley").unwrap().plan(&MissionConfig::default()).unwrap();
        assert_eq!(path.stroke_count(), 4);
    }
}
