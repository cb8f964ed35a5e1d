//! Dive plan files.
//!
//! A plan lists the gases carried and the levels the diver intends to reach:
//!
//! ```toml
//! [[gases]]
//! o2 = 0.21
//! he = 0.35
//!
//! [[gases]]
//! o2 = 0.50
//! role = "decompression"
//! switch_depth = 21
//!
//! [[levels]]
//! depth = 51
//! time = 25
//! ```
//!
//! Transits between levels are generated; the planner adds the ascent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::DiveInput;
use crate::types::{DiveSegment, Gas, GasRole};
use crate::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanGas {
    pub o2: f64,
    #[serde(default)]
    pub he: f64,
    #[serde(default = "default_role")]
    pub role: GasRole,
    #[serde(default)]
    pub switch_depth: Option<f64>,
    #[serde(default)]
    pub min_stop_time: Option<f64>,
}

fn default_role() -> GasRole {
    GasRole::Bottom
}

impl From<&PlanGas> for Gas {
    fn from(gas: &PlanGas) -> Self {
        Gas {
            o2: gas.o2,
            he: gas.he,
            role: gas.role,
            switch_depth: gas.switch_depth.unwrap_or(0.0),
            min_stop_time: gas.min_stop_time,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanLevel {
    /// Metres
    pub depth: f64,
    /// Minutes at depth
    pub time: f64,
    /// Index into `gases`; the bottom gas when omitted
    #[serde(default)]
    pub gas: Option<usize>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DivePlan {
    #[serde(default)]
    pub gases: Vec<PlanGas>,
    #[serde(default)]
    pub levels: Vec<PlanLevel>,
}

impl DivePlan {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let plan: DivePlan = toml::from_str(&contents)?;
        tracing::debug!(
            "Loaded plan from {:?}: {} gases, {} levels",
            path,
            plan.gases.len(),
            plan.levels.len()
        );
        Ok(plan)
    }

    fn bottom_gas(&self) -> Option<usize> {
        self.gases.iter().position(|g| g.role == GasRole::Bottom)
    }

    /// Check the plan for mistakes a diver could make writing it.
    ///
    /// Returns a list of problems, or an empty Vec if the plan is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.gases.is_empty() {
            errors.push("Plan has no gases".to_string());
        }
        let bottom_count = self
            .gases
            .iter()
            .filter(|g| g.role == GasRole::Bottom)
            .count();
        if !self.gases.is_empty() && bottom_count != 1 {
            errors.push(format!(
                "Plan needs exactly one bottom gas, found {}",
                bottom_count
            ));
        }

        for (i, gas) in self.gases.iter().enumerate() {
            let n = i + 1;
            if gas.o2 <= 0.0 || gas.o2 > 1.0 {
                errors.push(format!("Gas {}: o2 must be in (0, 1], got {}", n, gas.o2));
            }
            if gas.he < 0.0 || gas.he >= 1.0 {
                errors.push(format!("Gas {}: he must be in [0, 1), got {}", n, gas.he));
            }
            if gas.o2 + gas.he > 1.0 + 1e-9 {
                errors.push(format!("Gas {}: o2 + he exceeds 1", n));
            }
            match (gas.role, gas.switch_depth) {
                (GasRole::Decompression, None) => {
                    errors.push(format!("Gas {}: decompression gas needs switch_depth", n));
                }
                (GasRole::Decompression, Some(depth)) if depth <= 0.0 => {
                    errors.push(format!("Gas {}: switch_depth must be positive", n));
                }
                _ => {}
            }
            if let Some(minutes) = gas.min_stop_time {
                if minutes <= 0.0 {
                    errors.push(format!("Gas {}: min_stop_time must be positive", n));
                }
            }
        }

        let deco_depths: Vec<f64> = self
            .gases
            .iter()
            .filter(|g| g.role == GasRole::Decompression)
            .filter_map(|g| g.switch_depth)
            .collect();
        if deco_depths.windows(2).any(|w| w[1] >= w[0]) {
            errors.push("Decompression gases must be listed deepest switch first".to_string());
        }

        if self.levels.is_empty() {
            errors.push("Plan has no levels".to_string());
        }
        for (i, level) in self.levels.iter().enumerate() {
            let n = i + 1;
            if level.depth <= 0.0 {
                errors.push(format!("Level {}: depth must be positive", n));
            }
            if level.time < 0.0 {
                errors.push(format!("Level {}: time must not be negative", n));
            }
            if let Some(gas) = level.gas {
                if gas >= self.gases.len() {
                    errors.push(format!("Level {}: unknown gas {}", n, gas));
                }
            }
        }

        errors
    }

    /// Validate, turning any problems into one `InvalidPlan` error
    pub fn check(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidPlan(errors.join("; ")))
        }
    }

    /// Planner input: a transit to each level followed by the level itself
    pub fn expand(&self) -> Result<DiveInput> {
        self.check()?;
        let bottom = self.bottom_gas().unwrap_or(0);
        let mut segments = Vec::with_capacity(self.levels.len() * 2);
        let mut depth = 0.0;
        for level in &self.levels {
            let gas = level.gas.unwrap_or(bottom);
            if level.depth != depth {
                segments.push(DiveSegment::transit(depth, level.depth, gas));
            }
            segments.push(DiveSegment::level(level.depth, level.time, gas));
            depth = level.depth;
        }

        Ok(DiveInput {
            gases: self.gases.iter().map(Gas::from).collect(),
            segments,
            initial: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SegmentKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TRIMIX: &str = r#"
[[gases]]
o2 = 0.21
he = 0.35

[[gases]]
o2 = 0.50
role = "decompression"
switch_depth = 21
min_stop_time = 2

[[levels]]
depth = 51
time = 25

[[levels]]
depth = 40
time = 5
"#;

    #[test]
    fn test_load_plan_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TRIMIX.as_bytes()).unwrap();
        let plan = DivePlan::load(file.path()).unwrap();
        assert_eq!(plan.gases.len(), 2);
        assert_eq!(plan.gases[0].role, GasRole::Bottom);
        assert_eq!(plan.gases[1].switch_depth, Some(21.0));
        assert_eq!(plan.levels[1].gas, None);
        assert!(plan.validate().is_empty());
    }

    #[test]
    fn test_expand_generates_transits() {
        let plan: DivePlan = toml::from_str(TRIMIX).unwrap();
        let input = plan.expand().unwrap();
        let kinds: Vec<SegmentKind> = input.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Descent,
                SegmentKind::ConstantDepth,
                SegmentKind::Ascent,
                SegmentKind::ConstantDepth,
            ]
        );
        assert!(input.segments.iter().all(|s| s.gas == 0));
        assert_eq!(input.gases[1].min_stop_time, Some(2.0));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let plan: DivePlan = toml::from_str(
            r#"
[[gases]]
o2 = 0.5
he = 0.6
role = "decompression"

[[levels]]
depth = -3
time = 10
gas = 4
"#,
        )
        .unwrap();
        let errors = plan.validate();
        assert!(errors.iter().any(|e| e.contains("bottom gas")));
        assert!(errors.iter().any(|e| e.contains("exceeds 1")));
        assert!(errors.iter().any(|e| e.contains("switch_depth")));
        assert!(errors.iter().any(|e| e.contains("depth must be positive")));
        assert!(errors.iter().any(|e| e.contains("unknown gas")));
        assert!(matches!(plan.check(), Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[[levels]]\ndepth = \"deep\"\n").unwrap();
        assert!(matches!(DivePlan::load(file.path()), Err(Error::Toml(_))));
    }
}
