//! Rule-based preliminary reasoning per domain.
//!
//! Pure and synchronous: the same domain, mode and payload always produce the
//! same `DomainHint`. Missing or ill-typed fields never fail the run; they
//! yield a hint with no result and a note naming the field.

use ponder_core::OrchestrationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const NO_DEDUCTIVE: &str = "No deductive conclusion possible with given info.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Financial,
    Medical,
    Legal,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Financial => "financial",
            Domain::Medical => "medical",
            Domain::Legal => "legal",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "financial" => Ok(Domain::Financial),
            "medical" => Ok(Domain::Medical),
            "legal" => Ok(Domain::Legal),
            _ => Err(OrchestrationError::InvalidTask(format!(
                "unknown domain '{}' (expected financial, medical or legal)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningType {
    Deductive,
    Inductive,
    #[default]
    Both,
}

impl ReasoningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningType::Deductive => "deductive",
            ReasoningType::Inductive => "inductive",
            ReasoningType::Both => "both",
        }
    }
}

impl fmt::Display for ReasoningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningType {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deductive" => Ok(ReasoningType::Deductive),
            "inductive" => Ok(ReasoningType::Inductive),
            "both" => Ok(ReasoningType::Both),
            _ => Err(OrchestrationError::InvalidTask(format!(
                "unknown reasoning type '{}' (expected deductive, inductive or both)",
                s
            ))),
        }
    }
}

/// Precomputed verdict injected into the conversation before generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainHint {
    pub domain: Domain,
    pub reasoning_type: ReasoningType,
    pub preliminary_result: Option<String>,
    pub notes: Vec<String>,
}

impl DomainHint {
    pub fn as_system_message(&self) -> String {
        let mut msg = match &self.preliminary_result {
            Some(result) => format!(
                "Preliminary agentic reasoning result ({} domain, {}): {}",
                self.domain, self.reasoning_type, result
            ),
            None => format!(
                "Preliminary agentic reasoning produced no result ({} domain, {}).",
                self.domain, self.reasoning_type
            ),
        };
        if !self.notes.is_empty() {
            msg.push_str("\nNotes: ");
            msg.push_str(&self.notes.join("; "));
        }
        msg
    }
}

// ============================================================================
// Static case tables
// ============================================================================

struct MedicalCase {
    symptoms: &'static [&'static str],
    diagnosis: &'static str,
}

const MEDICAL_CASES: &[MedicalCase] = &[
    MedicalCase {
        symptoms: &["fever", "cough", "headache"],
        diagnosis: "Flu",
    },
    MedicalCase {
        symptoms: &["fever", "cough"],
        diagnosis: "Common Cold",
    },
    MedicalCase {
        symptoms: &["fever", "rash"],
        diagnosis: "Measles",
    },
    MedicalCase {
        symptoms: &["cough", "shortness of breath"],
        diagnosis: "Asthma",
    },
];

struct LegalCase {
    case_type: &'static str,
    signed: Option<bool>,
    evidence: Option<&'static str>,
    outcome: &'static str,
}

const LEGAL_CASES: &[LegalCase] = &[
    LegalCase {
        case_type: "contract",
        signed: Some(false),
        evidence: None,
        outcome: "Contract declared void (no signature)",
    },
    LegalCase {
        case_type: "contract",
        signed: Some(true),
        evidence: None,
        outcome: "Contract enforced by court",
    },
    LegalCase {
        case_type: "criminal",
        signed: None,
        evidence: Some("weak"),
        outcome: "Not guilty verdict",
    },
    LegalCase {
        case_type: "criminal",
        signed: None,
        evidence: Some("strong"),
        outcome: "Guilty verdict",
    },
    LegalCase {
        case_type: "civil",
        signed: None,
        evidence: None,
        outcome: "Case settled out of court",
    },
];

// ============================================================================
// Reasoner
// ============================================================================

/// A required field was missing or had the wrong type.
#[derive(Debug, Clone, PartialEq)]
struct Malformed(String);

type RuleResult = Result<String, Malformed>;

pub struct DomainReasoner;

impl DomainReasoner {
    pub fn evaluate(domain: Domain, reasoning_type: ReasoningType, payload: &Value) -> DomainHint {
        let mut notes = Vec::new();

        let preliminary_result = match payload.as_object() {
            None => {
                notes.push("payload is not a JSON object".to_string());
                None
            }
            Some(fields) => match reasoning_type {
                ReasoningType::Deductive => keep(deductive(domain, fields), &mut notes),
                ReasoningType::Inductive => keep(inductive(domain, fields), &mut notes),
                ReasoningType::Both => {
                    let lines: Vec<String> = [
                        ("deductive", deductive(domain, fields)),
                        ("inductive", inductive(domain, fields)),
                    ]
                    .into_iter()
                    .filter_map(|(mode, result)| {
                        keep(result, &mut notes).map(|r| format!("{}: {}", mode, r))
                    })
                    .collect();
                    (!lines.is_empty()).then(|| lines.join("\n"))
                }
            },
        };

        DomainHint {
            domain,
            reasoning_type,
            preliminary_result,
            notes,
        }
    }
}

fn keep(result: RuleResult, notes: &mut Vec<String>) -> Option<String> {
    match result {
        Ok(r) => Some(r),
        Err(Malformed(note)) => {
            notes.push(note);
            None
        }
    }
}

fn deductive(domain: Domain, payload: &Map<String, Value>) -> RuleResult {
    match domain {
        Domain::Financial => {
            let data = financial_fields(payload);
            let expected = required_number(data, "expectedReturn")?;
            let risk = required_str(data, "riskLevel")?;
            Ok(investment_decision(expected, risk).to_string())
        }
        Domain::Medical => {
            let symptoms = symptoms(payload)?;
            let has = |s: &str| symptoms.iter().any(|x| x == s);
            let chest_xray = payload
                .get("testResults")
                .and_then(|t| t.get("chestXRay"))
                .and_then(Value::as_str);

            let verdict = if has("fever") && has("rash") {
                "Diagnosis: Measles (fever + rash)"
            } else if has("fever") && has("cough") && chest_xray == Some("patchy") {
                "Diagnosis: Pneumonia (fever, cough, patchy x-ray)"
            } else if has("chest pain") && has("shortness of breath") {
                "Diagnosis: Possible Heart Attack (chest pain + breathing issues)"
            } else {
                NO_DEDUCTIVE
            };
            Ok(verdict.to_string())
        }
        Domain::Legal => {
            let case_type = required_str(payload, "caseType")?;
            let signed = payload.get("signed").and_then(Value::as_bool);
            let consideration = payload.get("consideration").and_then(Value::as_bool);
            let evidence = payload.get("evidence").and_then(Value::as_str);

            let verdict = match (case_type, signed, evidence) {
                ("contract", Some(false), _) => "Legal Outcome: Contract invalid (no signature)",
                ("contract", Some(true), _) if consideration != Some(false) => {
                    "Legal Outcome: Contract likely enforceable"
                }
                ("criminal", _, Some("strong")) => "Legal Outcome: Likely conviction",
                ("criminal", _, Some("weak")) => "Legal Outcome: Likely acquittal",
                _ => NO_DEDUCTIVE,
            };
            Ok(verdict.to_string())
        }
    }
}

fn inductive(domain: Domain, payload: &Map<String, Value>) -> RuleResult {
    match domain {
        Domain::Financial => {
            let data = financial_fields(payload);
            let past: Option<Vec<f64>> = data
                .get("pastReturns")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_f64).collect());
            let mut expected = data.get("expectedReturn").and_then(Value::as_f64);
            let mut risk = data
                .get("riskLevel")
                .and_then(Value::as_str)
                .map(str::to_string);

            if past.is_none() && (expected.is_none() || risk.is_none()) {
                return Err(Malformed(
                    "financial inductive reasoning needs pastReturns \
                     or expectedReturn and riskLevel"
                        .to_string(),
                ));
            }

            if let Some(returns) = past.as_deref() {
                if expected.is_none() && !returns.is_empty() {
                    expected = Some(mean(returns));
                }
                if risk.is_none() && returns.len() > 1 {
                    let centre = expected.unwrap_or_else(|| mean(returns));
                    risk = Some(volatility_band(returns, centre).to_string());
                }
            }

            match (expected, risk) {
                (Some(e), Some(r)) => Ok(investment_decision(e, &r).to_string()),
                (e, r) => Ok(format!(
                    "Inductive estimates (no direct rule applied): \
                     estimated return {}, estimated risk {}",
                    e.map(|v| format!("{:.4}", v))
                        .unwrap_or_else(|| "unknown".into()),
                    r.unwrap_or_else(|| "unknown".into())
                )),
            }
        }
        Domain::Medical => {
            let symptoms = symptoms(payload)?;
            let mut best: Option<(&str, usize)> = None;
            for case in MEDICAL_CASES {
                let overlap = case
                    .symptoms
                    .iter()
                    .filter(|s| symptoms.iter().any(|x| x.as_str() == **s))
                    .count();
                if overlap > 0 && best.map_or(true, |(_, n)| overlap > n) {
                    best = Some((case.diagnosis, overlap));
                }
            }
            Ok(match best {
                Some((diagnosis, _)) => {
                    format!("Possible Diagnosis: {} (similar cases)", diagnosis)
                }
                None => "Diagnosis unclear (no close match)".to_string(),
            })
        }
        Domain::Legal => {
            let case_type = required_str(payload, "caseType")?;
            let signed = payload.get("signed").and_then(Value::as_bool);
            let evidence = payload.get("evidence").and_then(Value::as_str);

            let matched = LEGAL_CASES.iter().find(|rec| {
                rec.case_type == case_type
                    && match (rec.signed, rec.evidence) {
                        (None, None) => true,
                        (Some(s), _) if Some(s) == signed => true,
                        (_, Some(e)) if Some(e) == evidence => true,
                        _ => false,
                    }
            });
            Ok(match matched {
                Some(rec) => format!("Likely Outcome: {} (similar past case)", rec.outcome),
                None => "Outcome unclear (no similar cases)".to_string(),
            })
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn investment_decision(expected_return: f64, risk_level: &str) -> &'static str {
    if expected_return > 0.05 && risk_level == "low" {
        "Decision: Invest (high return, low risk)"
    } else if expected_return < 0.0 || risk_level == "high" {
        "Decision: Do Not Invest (insufficient return or high risk)"
    } else {
        "Decision: Hold (moderate return/risk)"
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `centre`, bucketed into a risk level.
fn volatility_band(values: &[f64], centre: f64) -> &'static str {
    let variance = values.iter().map(|r| (r - centre).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev > 0.1 {
        "high"
    } else if std_dev < 0.05 {
        "low"
    } else {
        "medium"
    }
}

/// Financial fields live under `data` when present, otherwise at the top level.
fn financial_fields(payload: &Map<String, Value>) -> &Map<String, Value> {
    payload
        .get("data")
        .and_then(Value::as_object)
        .unwrap_or(payload)
}

fn required_number(fields: &Map<String, Value>, key: &str) -> Result<f64, Malformed> {
    match fields.get(key) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| Malformed(format!("field '{}' must be a number", key))),
        None => Err(Malformed(format!("missing required field '{}'", key))),
    }
}

fn required_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a str, Malformed> {
    match fields.get(key) {
        Some(v) => v
            .as_str()
            .ok_or_else(|| Malformed(format!("field '{}' must be a string", key))),
        None => Err(Malformed(format!("missing required field '{}'", key))),
    }
}

fn symptoms(payload: &Map<String, Value>) -> Result<Vec<String>, Malformed> {
    let list = payload
        .get("symptoms")
        .ok_or_else(|| Malformed("missing required field 'symptoms'".to_string()))?
        .as_array()
        .ok_or_else(|| Malformed("field 'symptoms' must be a list of strings".to_string()))?;
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_financial_deductive_invest() {
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Deductive,
            &json!({ "expectedReturn": 0.12, "riskLevel": "low" }),
        );
        assert_eq!(
            hint.preliminary_result.as_deref(),
            Some("Decision: Invest (high return, low risk)")
        );
        assert!(hint.notes.is_empty());
    }

    #[test]
    fn test_financial_reads_nested_data() {
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Deductive,
            &json!({ "data": { "expectedReturn": -0.01, "riskLevel": "medium" } }),
        );
        assert_eq!(
            hint.preliminary_result.as_deref(),
            Some("Decision: Do Not Invest (insufficient return or high risk)")
        );
    }

    #[test]
    fn test_financial_missing_field_is_note_not_failure() {
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Deductive,
            &json!({ "expectedReturn": 0.12 }),
        );
        assert!(hint.preliminary_result.is_none());
        assert_eq!(hint.notes, vec!["missing required field 'riskLevel'".to_string()]);
    }

    #[test]
    fn test_financial_inductive_from_past_returns() {
        // mean 0.06, tiny spread -> low risk -> invest
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Inductive,
            &json!({ "data": { "pastReturns": [0.05, 0.06, 0.07] } }),
        );
        assert_eq!(
            hint.preliminary_result.as_deref(),
            Some("Decision: Invest (high return, low risk)")
        );
    }

    #[test]
    fn test_financial_inductive_single_return_has_no_risk_estimate() {
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Inductive,
            &json!({ "pastReturns": [0.08] }),
        );
        let result = hint.preliminary_result.unwrap();
        assert!(result.starts_with("Inductive estimates"));
        assert!(result.contains("0.0800"));
        assert!(result.contains("estimated risk unknown"));
    }

    #[test]
    fn test_medical_deductive_and_inductive() {
        let payload = json!({ "symptoms": ["fever", "rash"] });
        let hint = DomainReasoner::evaluate(Domain::Medical, ReasoningType::Both, &payload);
        assert_eq!(
            hint.preliminary_result.as_deref(),
            Some(
                "deductive: Diagnosis: Measles (fever + rash)\n\
                 inductive: Possible Diagnosis: Measles (similar cases)"
            )
        );
    }

    #[test]
    fn test_medical_pneumonia_requires_patchy_xray() {
        let with_xray = json!({
            "symptoms": ["fever", "cough"],
            "testResults": { "chestXRay": "patchy" }
        });
        let without = json!({ "symptoms": ["fever", "cough"] });
        assert_eq!(
            DomainReasoner::evaluate(Domain::Medical, ReasoningType::Deductive, &with_xray)
                .preliminary_result
                .as_deref(),
            Some("Diagnosis: Pneumonia (fever, cough, patchy x-ray)")
        );
        assert_eq!(
            DomainReasoner::evaluate(Domain::Medical, ReasoningType::Deductive, &without)
                .preliminary_result
                .as_deref(),
            Some(NO_DEDUCTIVE)
        );
    }

    #[test]
    fn test_medical_inductive_first_best_wins() {
        // Flu and Common Cold both overlap twice; Flu is listed first.
        let hint = DomainReasoner::evaluate(
            Domain::Medical,
            ReasoningType::Inductive,
            &json!({ "symptoms": ["fever", "cough"] }),
        );
        assert_eq!(
            hint.preliminary_result.as_deref(),
            Some("Possible Diagnosis: Flu (similar cases)")
        );

        let none = DomainReasoner::evaluate(
            Domain::Medical,
            ReasoningType::Inductive,
            &json!({ "symptoms": ["nausea"] }),
        );
        assert_eq!(
            none.preliminary_result.as_deref(),
            Some("Diagnosis unclear (no close match)")
        );
    }

    #[test]
    fn test_legal_rules() {
        let unsigned = json!({ "caseType": "contract", "signed": false });
        assert_eq!(
            DomainReasoner::evaluate(Domain::Legal, ReasoningType::Both, &unsigned)
                .preliminary_result
                .as_deref(),
            Some(
                "deductive: Legal Outcome: Contract invalid (no signature)\n\
                 inductive: Likely Outcome: Contract declared void (no signature) \
                 (similar past case)"
            )
        );

        let civil = json!({ "caseType": "civil" });
        assert_eq!(
            DomainReasoner::evaluate(Domain::Legal, ReasoningType::Inductive, &civil)
                .preliminary_result
                .as_deref(),
            Some("Likely Outcome: Case settled out of court (similar past case)")
        );

        let unknown = json!({ "caseType": "maritime" });
        assert_eq!(
            DomainReasoner::evaluate(Domain::Legal, ReasoningType::Inductive, &unknown)
                .preliminary_result
                .as_deref(),
            Some("Outcome unclear (no similar cases)")
        );
    }

    #[test]
    fn test_both_with_one_side_malformed() {
        // Deductive needs riskLevel; inductive can estimate from pastReturns.
        let hint = DomainReasoner::evaluate(
            Domain::Financial,
            ReasoningType::Both,
            &json!({ "pastReturns": [0.02, 0.03] }),
        );
        let result = hint.preliminary_result.unwrap();
        assert!(result.starts_with("inductive: "));
        assert_eq!(hint.notes.len(), 1);
    }

    #[test]
    fn test_non_object_payload() {
        let hint = DomainReasoner::evaluate(Domain::Legal, ReasoningType::Both, &json!([1, 2]));
        assert!(hint.preliminary_result.is_none());
        assert_eq!(hint.notes, vec!["payload is not a JSON object".to_string()]);
    }

    #[test]
    fn test_system_message_rendering() {
        let hint = DomainHint {
            domain: Domain::Legal,
            reasoning_type: ReasoningType::Deductive,
            preliminary_result: None,
            notes: vec!["missing required field 'caseType'".into()],
        };
        let msg = hint.as_system_message();
        assert!(msg.contains("no result"));
        assert!(msg.contains("missing required field 'caseType'"));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Financial".parse::<Domain>().unwrap(), Domain::Financial);
        assert!("astrology".parse::<Domain>().is_err());
        assert_eq!("BOTH".parse::<ReasoningType>().unwrap(), ReasoningType::Both);
    }
}
