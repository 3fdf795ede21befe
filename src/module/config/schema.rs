//! Parameter Validation
//!
//! Reviews a resolved parameter set against the recognized keys and reports
//! findings instead of failing: unknown keys are warnings (a newer config
//! may carry keys this version does not know yet), while out-of-choice and
//! out-of-range values are errors the caller can decide to block on. Type
//! checking lives here rather than in the loader so that introducing a new
//! optional key never requires a parser change.

use std::fmt;

use toml::Value;

use super::defaults;
use super::resolver::ResolvedParameterSet;
use super::store::SectionPath;

/// How serious one finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One validation finding. Findings are data, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    pub section_path: SectionPath,
    pub key: String,
    pub message: String,
}

impl Finding {
    fn warning(path: &SectionPath, key: &str, message: String) -> Self {
        Finding {
            severity: Severity::Warning,
            section_path: path.clone(),
            key: key.to_string(),
            message,
        }
    }

    fn error(path: &SectionPath, key: &str, message: String) -> Self {
        Finding {
            severity: Severity::Error,
            section_path: path.clone(),
            key: key.to_string(),
            message,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}: {}.{}: {}",
            severity, self.section_path, self.key, self.message
        )
    }
}

// Keys restricted to an enumerated set of choices.
const ENUM_CHOICES: &[(&str, &str, &[&str])] = &[
    (
        "filtering",
        "type",
        &["butterworth", "kalman", "gaussian", "LOESS", "median", "butterworth_on_speed"],
    ),
    ("pose", "mode", &["lightweight", "balanced", "performance"]),
    ("calibration", "calibration_type", &["convert", "calculate"]),
    (
        "calibration.convert",
        "convert_from",
        &["caliscope", "qualisys", "optitrack", "vicon", "opencap", "easymocap", "biocv", "anipose", "freemocap"],
    ),
    (
        "calibration.calculate.extrinsics",
        "extrinsics_method",
        &["board", "scene", "keypoints"],
    ),
    (
        "triangulation",
        "interpolation",
        &["linear", "slinear", "quadratic", "cubic", "none"],
    ),
    (
        "triangulation",
        "fill_large_gaps_with",
        &["last_value", "nan", "zeros"],
    ),
];

// Numeric keys with a declared domain, as closed [min, max] intervals.
const NUMERIC_RANGES: &[(&str, &str, f64, f64)] = &[
    ("pose", "det_frequency", 1.0, f64::INFINITY),
    ("triangulation", "min_cameras_for_triangulation", 2.0, f64::INFINITY),
    ("filtering.butterworth", "order", 1.0, f64::INFINITY),
    ("filtering.butterworth_on_speed", "order", 1.0, f64::INFINITY),
    ("synchronization", "likelihood_threshold", 0.0, 1.0),
    ("triangulation", "likelihood_threshold_triangulation", 0.0, 1.0),
    ("personAssociation", "likelihood_threshold_association", 0.0, 1.0),
];

// Keys whose legitimate values span more than one TOML type, e.g.
// frame_rate = 'auto' or frame_rate = 60. Exempt from the type check.
const MIXED_TYPE_KEYS: &[(&str, &str)] = &[
    ("project", "frame_rate"),
    ("project", "participant_height"),
    ("pose", "save_video"),
    ("pose", "output_format"),
    ("synchronization", "keypoints_to_consider"),
    ("synchronization", "approx_time_maxspeed"),
];

/// Review a resolved parameter set. Never fails; the returned findings are
/// ordered by section path and key.
pub fn validate(resolved: &ResolvedParameterSet) -> Vec<Finding> {
    let schema = defaults::default_store();
    let mut findings = Vec::new();

    for (path, keys) in resolved.sections() {
        // Custom skeleton declarations live under `pose.<MODEL>` and are
        // free-form; the skeleton builder is their validator.
        if path.segments().len() > 1 && path.segments()[0] == "pose" {
            continue;
        }
        for (key, value) in keys {
            match schema.get(path, key) {
                None => findings.push(Finding::warning(
                    path,
                    key,
                    "unknown key, not in the recognized parameter set".to_string(),
                )),
                Some(default_value) => {
                    if MIXED_TYPE_KEYS
                        .iter()
                        .any(|(p, k)| path == &SectionPath::from_dotted(p) && key == k)
                    {
                        continue;
                    }
                    let expected = type_name(default_value);
                    let actual = type_name(value);
                    if expected != actual {
                        findings.push(Finding::error(
                            path,
                            key,
                            format!("expected a {} value, got a {}", expected, actual),
                        ));
                    }
                }
            }
        }
    }

    for (section, key, choices) in ENUM_CHOICES {
        let path = SectionPath::from_dotted(section);
        if let Some(Value::String(value)) = resolved.get(&path, key) {
            if !choices.contains(&value.as_str()) {
                findings.push(Finding::error(
                    &path,
                    key,
                    format!("`{}` is not one of {}", value, choices.join(", ")),
                ));
            }
        }
    }

    for (section, key, min, max) in NUMERIC_RANGES {
        let path = SectionPath::from_dotted(section);
        if let Some(value) = resolved.get(&path, key).and_then(as_number) {
            if value < *min || value > *max {
                let domain = if max.is_infinite() {
                    format!("must be at least {}", min)
                } else {
                    format!("must be within [{}, {}]", min, max)
                };
                findings.push(Finding::error(&path, key, format!("{} ({})", value, domain)));
            }
        }
    }

    findings.sort_by(|a, b| {
        (&a.section_path, &a.key).cmp(&(&b.section_path, &b.key))
    });
    findings
}

/// Coarse TOML type name: integers and floats are both numbers.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Boolean(_) => "boolean",
        Value::Integer(_) | Value::Float(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Table(_) => "table",
        Value::Datetime(_) => "datetime",
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}
