//! C9: the custom text configuration format and the typed `RunConfig` it
//! parses into. Format and coercion rules are taken verbatim from
//! `original_source/plom.py`'s `parse_input`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::dmaps::EpsilonSpec;
use crate::error::PlomError;
use crate::pca::PcaMethod;
use crate::scale::ScaleMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionSource {
    Raw,
    Scaled,
    Pca,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionTarget {
    Dmaps,
    Pca,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub training: PathBuf,
    pub scaling_method: ScaleMethod,
    pub pca_method: PcaMethod,
    pub pca_scale_evecs: bool,
    pub dmaps_epsilon: EpsilonSpec,
    pub dmaps_kappa: i32,
    pub dmaps_l: f64,
    pub dmaps_first_evec: bool,
    pub dmaps_m_override: usize,
    pub projection_source: ProjectionSource,
    pub projection_target: ProjectionTarget,
    pub num_samples: usize,
    pub ito_f0: f64,
    pub ito_dr: f64,
    pub ito_steps: Option<usize>,
    pub ito_kde_bw_factor: f64,
    pub parallel: bool,
    pub n_jobs: usize,
    pub save_samples: bool,
    pub samples_fname: Option<String>,
    pub job_desc: String,
    pub verbose: bool,
}

/// A raw value after comment-stripping, quote-stripping, and type coercion,
/// but before being assigned to a `RunConfig` field.
#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Str(String),
}

impl Value {
    fn coerce(raw: &str) -> Self {
        let unquoted = strip_quotes(raw);
        if let Ok(i) = unquoted.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = unquoted.parse::<f64>() {
            return Value::Float(f);
        }
        match unquoted.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            "none" => return Value::None,
            _ => {}
        }
        Value::Str(unquoted.to_string())
    }

    fn as_f64(&self, stage: &'static str, key: &str) -> Result<f64, PlomError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(PlomError::BadValue {
                stage,
                key: key.to_string(),
                value: other.describe(),
            }),
        }
    }

    fn as_i64(&self, stage: &'static str, key: &str) -> Result<i64, PlomError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(PlomError::BadValue {
                stage,
                key: key.to_string(),
                value: other.describe(),
            }),
        }
    }

    fn as_bool(&self, stage: &'static str, key: &str) -> Result<bool, PlomError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(PlomError::BadValue {
                stage,
                key: key.to_string(),
                value: other.describe(),
            }),
        }
    }

    fn as_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.describe(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::None => "None".to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Parse the text format into a raw key → value map, applying comment
/// stripping but no type/semantic validation.
fn parse_raw(text: &str) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('*') || trimmed.starts_with('#') {
            continue;
        }
        let without_comment = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let Some(eq) = without_comment.find('=') else {
            continue;
        };
        let key = without_comment[..eq].trim().to_string();
        let value = without_comment[eq + 1..].trim();
        if value.is_empty() {
            continue;
        }
        map.insert(key, Value::coerce(value));
    }
    map
}

const STAGE: &str = "config";

const RECOGNIZED_KEYS: &[&str] = &[
    "training",
    "scaling",
    "scaling_method",
    "pca",
    "pca_method",
    "pca_cum_energy",
    "pca_eigv_cutoff",
    "pca_dim",
    "pca_scale_evecs",
    "dmaps",
    "dmaps_epsilon",
    "dmaps_kappa",
    "dmaps_l",
    "dmaps_first_evec",
    "dmaps_m_override",
    "projection_source",
    "projection_target",
    "sampling",
    "num_samples",
    "ito_f0",
    "ito_dr",
    "ito_steps",
    "ito_pot_method",
    "ito_kde_bw_factor",
    "parallel",
    "n_jobs",
    "save_samples",
    "samples_fname",
    "job_desc",
    "verbose",
];

impl RunConfig {
    pub fn parse(text: &str) -> Result<Self, PlomError> {
        let raw = parse_raw(text);
        for key in raw.keys() {
            if !RECOGNIZED_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                return Err(PlomError::UnknownKey { stage: STAGE, key: key.clone() });
            }
        }

        let training = raw
            .get("training")
            .map(|v| PathBuf::from(v.as_str()))
            .ok_or_else(|| PlomError::IncompatibleOptions {
                stage: STAGE,
                message: "`training` is required".to_string(),
            })?;

        let scaling_method = match raw.get("scaling_method").or_else(|| raw.get("scaling")) {
            None => ScaleMethod::Normalize,
            Some(v) => match v.as_str().as_str() {
                "MinMax" | "minmax" => ScaleMethod::MinMax,
                "Normalization" | "normalization" | "normalize" => ScaleMethod::Normalize,
                other => {
                    return Err(PlomError::BadValue {
                        stage: STAGE,
                        key: "scaling_method".to_string(),
                        value: other.to_string(),
                    })
                }
            },
        };

        let pca_cum_energy = match raw.get("pca_cum_energy") {
            Some(v) => v.as_f64(STAGE, "pca_cum_energy")?,
            None => 0.9,
        };
        let pca_method_name = raw
            .get("pca_method")
            .or_else(|| raw.get("pca"))
            .map(|v| v.as_str())
            .unwrap_or_else(|| "cum_energy".to_string());
        let pca_method = match pca_method_name.as_str() {
            "cum_energy" => PcaMethod::CumEnergy(pca_cum_energy),
            "eigv_cutoff" => {
                let c = raw
                    .get("pca_eigv_cutoff")
                    .ok_or_else(|| PlomError::IncompatibleOptions {
                        stage: STAGE,
                        message: "pca_method=eigv_cutoff requires pca_eigv_cutoff".to_string(),
                    })?
                    .as_f64(STAGE, "pca_eigv_cutoff")?;
                PcaMethod::EigvCutoff(c)
            }
            "pca_dim" => {
                let k = raw
                    .get("pca_dim")
                    .ok_or_else(|| PlomError::IncompatibleOptions {
                        stage: STAGE,
                        message: "pca_method=pca_dim requires pca_dim".to_string(),
                    })?
                    .as_i64(STAGE, "pca_dim")?;
                PcaMethod::PcaDim(k.max(1) as usize)
            }
            other => {
                return Err(PlomError::BadValue {
                    stage: STAGE,
                    key: "pca_method".to_string(),
                    value: other.to_string(),
                })
            }
        };
        let pca_scale_evecs = match raw.get("pca_scale_evecs") {
            Some(v) => v.as_bool(STAGE, "pca_scale_evecs")?,
            None => true,
        };

        let dmaps_epsilon = match raw.get("dmaps_epsilon") {
            Some(v) => EpsilonSpec::Fixed(v.as_f64(STAGE, "dmaps_epsilon")?),
            None => EpsilonSpec::Auto,
        };
        let dmaps_kappa = match raw.get("dmaps_kappa") {
            Some(v) => v.as_i64(STAGE, "dmaps_kappa")? as i32,
            None => 1,
        };
        let dmaps_l = match raw.get("dmaps_l") {
            Some(v) => v.as_f64(STAGE, "dmaps_l")?,
            None => 0.1,
        };
        let dmaps_first_evec = match raw.get("dmaps_first_evec") {
            Some(v) => v.as_bool(STAGE, "dmaps_first_evec")?,
            None => false,
        };
        let dmaps_m_override = match raw.get("dmaps_m_override") {
            Some(v) => v.as_i64(STAGE, "dmaps_m_override")?.max(0) as usize,
            None => 0,
        };

        let projection_source = match raw.get("projection_source") {
            None => ProjectionSource::Pca,
            Some(v) => match v.as_str().as_str() {
                "pca" => ProjectionSource::Pca,
                "scaling" => ProjectionSource::Scaled,
                "data" => ProjectionSource::Raw,
                other => {
                    return Err(PlomError::BadValue {
                        stage: STAGE,
                        key: "projection_source".to_string(),
                        value: other.to_string(),
                    })
                }
            },
        };
        let projection_target = match raw.get("projection_target") {
            None => ProjectionTarget::Dmaps,
            Some(v) => match v.as_str().as_str() {
                "dmaps" => ProjectionTarget::Dmaps,
                "pca" => ProjectionTarget::Pca,
                other => {
                    return Err(PlomError::BadValue {
                        stage: STAGE,
                        key: "projection_target".to_string(),
                        value: other.to_string(),
                    })
                }
            },
        };

        let num_samples = match raw.get("num_samples") {
            Some(v) => v.as_i64(STAGE, "num_samples")?.max(1) as usize,
            None => 1,
        };
        let ito_f0 = match raw.get("ito_f0") {
            Some(v) => v.as_f64(STAGE, "ito_f0")?,
            None => 1.5,
        };
        // `ito_dr` defaults from `ito_f0` so that the well-tested (f0=1.5,
        // dr=0.1) combination remains the default when neither is supplied.
        let ito_dr = match raw.get("ito_dr") {
            Some(v) => v.as_f64(STAGE, "ito_dr")?,
            None => 0.15 / ito_f0,
        };
        let ito_steps = match raw.get("ito_steps") {
            Some(v) => Some(v.as_i64(STAGE, "ito_steps")?.max(1) as usize),
            None => None,
        };
        let ito_kde_bw_factor = match raw.get("ito_kde_bw_factor") {
            Some(v) => v.as_f64(STAGE, "ito_kde_bw_factor")?,
            None => 1.0,
        };

        let parallel = match raw.get("parallel") {
            Some(v) => v.as_bool(STAGE, "parallel")?,
            None => false,
        };
        let n_jobs = match raw.get("n_jobs") {
            Some(v) => v.as_i64(STAGE, "n_jobs")?.max(1) as usize,
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
        let save_samples = match raw.get("save_samples") {
            Some(v) => v.as_bool(STAGE, "save_samples")?,
            None => true,
        };
        let samples_fname = raw.get("samples_fname").map(|v| v.as_str());
        let job_desc = raw.get("job_desc").map(|v| v.as_str()).unwrap_or_else(|| "plom_run".to_string());
        let verbose = match raw.get("verbose") {
            Some(v) => v.as_bool(STAGE, "verbose")?,
            None => false,
        };

        Ok(Self {
            training,
            scaling_method,
            pca_method,
            pca_scale_evecs,
            dmaps_epsilon,
            dmaps_kappa,
            dmaps_l,
            dmaps_first_evec,
            dmaps_m_override,
            projection_source,
            projection_target,
            num_samples,
            ito_f0,
            ito_dr,
            ito_steps,
            ito_kde_bw_factor,
            parallel,
            n_jobs,
            save_samples,
            samples_fname,
            job_desc,
            verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_inline_trailing_comments() {
        let text = "\
* this whole line is a comment
# so is this one
training = data.txt  # load the N x n matrix
pca_dim = 4
";
        let cfg = RunConfig::parse(text).unwrap();
        assert_eq!(cfg.training, PathBuf::from("data.txt"));
        match cfg.pca_method {
            PcaMethod::PcaDim(4) => {}
            other => panic!("unexpected pca method {other:?}"),
        }
    }

    #[test]
    fn strips_matching_quotes() {
        let text = "training = \"data.txt\"\njob_desc = 'my run'\n";
        let cfg = RunConfig::parse(text).unwrap();
        assert_eq!(cfg.training, PathBuf::from("data.txt"));
        assert_eq!(cfg.job_desc, "my run");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let text = "training = data.txt\nbogus_key = 1\n";
        assert!(matches!(RunConfig::parse(text), Err(PlomError::UnknownKey { .. })));
    }

    #[test]
    fn missing_training_is_incompatible_options() {
        let text = "verbose = true\n";
        assert!(matches!(RunConfig::parse(text), Err(PlomError::IncompatibleOptions { .. })));
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let text = "training = data.txt\n";
        let cfg = RunConfig::parse(text).unwrap();
        assert_eq!(cfg.scaling_method, ScaleMethod::Normalize);
        assert!(cfg.pca_scale_evecs);
        assert_eq!(cfg.dmaps_kappa, 1);
        assert_eq!(cfg.dmaps_l, 0.1);
        assert!(!cfg.dmaps_first_evec);
        assert_eq!(cfg.dmaps_m_override, 0);
        assert_eq!(cfg.projection_source, ProjectionSource::Pca);
        assert_eq!(cfg.projection_target, ProjectionTarget::Dmaps);
        assert_eq!(cfg.num_samples, 1);
        assert_eq!(cfg.ito_f0, 1.5);
        assert!(!cfg.parallel);
        assert!(!cfg.verbose);
    }

    #[test]
    fn ito_dr_defaults_from_ito_f0() {
        let text = "training = data.txt\nito_f0 = 1.5\n";
        let cfg = RunConfig::parse(text).unwrap();
        assert!((cfg.ito_dr - 0.1).abs() < 1e-12);
    }
}
