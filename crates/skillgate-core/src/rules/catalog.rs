//! Static rule table for the security scanner.
//!
//! Rules are data: an ordered list of (id, category, pattern, weight)
//! entries evaluated over immutable bundle text. A few rules add a
//! confirmation step on each candidate match (decode it, measure its
//! entropy) before it counts. Table order is the
//! order findings are reported in, and must only change together with
//! `RULE_CATALOG_VERSION`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Instruction-override or policy-bypass phrasing.
    Override,
    /// Cues to leak secrets, credentials or hidden prompts.
    Exfiltration,
    PathBreakout,
    EncodedPayload,
    /// Remote payloads piped to a shell, destructive or shell-spawning
    /// commands.
    CommandExecution,
    /// Hidden or invisible instruction blocks, reappearing headers.
    StructuralAnomaly,
}

/// Which slice of the document a rule is matched against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Document,
    Body,
}

/// Extra check a candidate match must pass to become a finding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confirm {
    /// The match alone is enough.
    Match,
    /// The match decodes as base64 to text containing one of
    /// `ENCODED_KEYWORDS`.
    DecodesToKeywords,
    /// Shannon entropy of the match, in bits per byte, is at least this.
    Entropy(f64),
    /// The words `ignore` and `previous` do not both appear intact in the
    /// match; plain phrasing is left to the override rules.
    Obfuscated,
}

/// Words that make a decoded payload suspicious.
pub const ENCODED_KEYWORDS: [&str; 8] = [
    "ignore",
    "instructions",
    "system",
    "developer",
    "secret",
    "token",
    "password",
    "bypass",
];

#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub id: &'static str,
    pub category: FindingCategory,
    pub title: &'static str,
    pub pattern: &'static str,
    pub weight: u32,
    /// A match forces `high` risk regardless of the aggregate score.
    pub hard_fail: bool,
    pub target: Target,
    pub confirm: Confirm,
}

pub const RULES: &[RuleSpec] = &[
    // Override / bypass
    RuleSpec {
        id: "OVR-01",
        category: FindingCategory::Override,
        title: "Instruction override",
        pattern: r"(?i)\b(ignore|disregard|forget|skip)\s+(all\s+|any\s+|the\s+)?(previous|prior|above|earlier|preceding|your)\s+(instructions|rules|directions|guidelines|prompts?)",
        weight: 40,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-02",
        category: FindingCategory::Override,
        title: "Unrestricted mode switch",
        pattern: r"(?i)\byou\s+are\s+now\s+(in\s+)?(developer|dan|jailbreak|unrestricted|god)\s+mode",
        weight: 45,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-03",
        category: FindingCategory::Override,
        title: "Safety bypass",
        pattern: r"(?i)\b(bypass|override|disable|circumvent)\s+(the\s+|all\s+|any\s+)?(safety|security|content|moderation)\s+(filters?|polic(y|ies)|guardrails?|checks?|restrictions?)",
        weight: 35,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-04",
        category: FindingCategory::Override,
        title: "Concealment from user",
        pattern: r"(?i)\bdo\s+not\s+(tell|inform|alert|notify)\s+the\s+user",
        weight: 30,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-05",
        category: FindingCategory::Override,
        title: "Injected system prompt",
        pattern: r"(?i)\b(new|updated|real)\s+system\s+(prompt|instructions)\s*:",
        weight: 40,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-06",
        category: FindingCategory::Override,
        title: "System prompt override",
        pattern: r"(?i)\b(ignore|disregard|forget|override)\s+(?:[\w'-]+\s+){0,3}?(system|developer)\s+(instructions?|prompts?|messages?)\b",
        weight: 50,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-07",
        category: FindingCategory::Override,
        title: "System prompt override (trailing verb)",
        pattern: r"(?i)\b(system|developer)\s+(instructions?|prompts?|messages?)\b(?:[\s\W]{0,40}\b(ignore|disregard|override|forget)\b|\s+(?:is|are|should\s+be|must\s+be|can\s+be)\s+(ignored|disregarded|overridden|forgotten)\b)",
        weight: 50,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "OVR-08",
        category: FindingCategory::Override,
        title: "Obfuscated override",
        pattern: r"(?i)\bi\W*g\W*n\W*o\W*r\W*e[\s\W]{0,40}p\W*r\W*e\W*v\W*i\W*o\W*u\W*s",
        weight: 30,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Obfuscated,
    },
    // Exfiltration
    RuleSpec {
        id: "EXF-01",
        category: FindingCategory::Exfiltration,
        title: "Prompt disclosure request",
        pattern: r"(?i)\b(reveal|print|show|output|dump|leak|repeat)\s+(me\s+)?(your|the)\s+(full\s+|entire\s+)?(system\s+prompt|hidden\s+instructions|initial\s+instructions)",
        weight: 30,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "EXF-02",
        category: FindingCategory::Exfiltration,
        title: "Secret transmission",
        pattern: r"(?i)\b(send|upload|post|exfiltrate|transmit|forward)\b[^\n]{0,60}\b(api[\s_-]?keys?|credentials|secrets?|access\s+tokens?|passwords?|private\s+keys?)",
        weight: 40,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "EXF-03",
        category: FindingCategory::Exfiltration,
        title: "Credential file access",
        pattern: r"(?i)\b(cat|read|print|copy|upload)\s+[^\n]{0,30}(id_rsa|id_ed25519|\.aws/credentials|\.netrc|\.env\b)",
        weight: 45,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "EXF-04",
        category: FindingCategory::Exfiltration,
        title: "Secret in outbound request",
        pattern: r"(?i)\b(curl|wget)\b[^\n]{0,160}\$\{?[A-Z0-9_]*(KEY|TOKEN|SECRET|PASSWORD)",
        weight: 50,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    // Path breakout
    RuleSpec {
        id: "PTH-01",
        category: FindingCategory::PathBreakout,
        title: "Deep parent traversal",
        pattern: r"(\.\.[/\\]){3,}",
        weight: 20,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "PTH-02",
        category: FindingCategory::PathBreakout,
        title: "System file path",
        pattern: r"(?i)(/etc/(passwd|shadow|sudoers)\b|c:\\windows\\system32)",
        weight: 25,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "PTH-03",
        category: FindingCategory::PathBreakout,
        title: "Home credential directory",
        pattern: r"(~|\$HOME)/\.(ssh|aws|gnupg|kube)\b",
        weight: 20,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    // Encoded payloads
    RuleSpec {
        id: "ENC-01",
        category: FindingCategory::EncodedPayload,
        title: "High-entropy base64 blob",
        pattern: r"[A-Za-z0-9+/]{140,}={0,2}",
        weight: 15,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Entropy(3.7),
    },
    RuleSpec {
        id: "ENC-02",
        category: FindingCategory::EncodedPayload,
        title: "Decode primitive",
        pattern: r"(?i)(base64\s+(-d|--decode)|\batob\s*\(|frombase64string|b64decode)",
        weight: 20,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "ENC-03",
        category: FindingCategory::EncodedPayload,
        title: "Hex escape run",
        pattern: r"(\\x[0-9a-fA-F]{2}){8,}",
        weight: 20,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "ENC-04",
        category: FindingCategory::EncodedPayload,
        title: "Decode piped to shell",
        pattern: r"(?i)(base64\s+(-d|--decode)|xxd\s+-r)[^\n]{0,80}\|\s*(ba|z|da)?sh\b",
        weight: 60,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "ENC-05",
        category: FindingCategory::EncodedPayload,
        title: "Encoded instruction payload",
        pattern: r"[A-Za-z0-9+/]{80,}={0,2}",
        weight: 30,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::DecodesToKeywords,
    },
    RuleSpec {
        id: "ENC-06",
        category: FindingCategory::EncodedPayload,
        title: "High-entropy hex run",
        pattern: r"\b[0-9a-fA-F]{96,}\b",
        weight: 10,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Entropy(3.2),
    },
    // Command execution
    RuleSpec {
        id: "CMD-01",
        category: FindingCategory::CommandExecution,
        title: "Remote script piped to shell",
        pattern: r"(?i)\b(curl|wget|invoke-webrequest|iwr)\b[^\n|]{0,80}\|\s*(sudo\s+)?(ba|z|da)?sh\b|\b(curl|wget|invoke-webrequest|iwr)\b[^\n|]{0,80}\|\s*(powershell|pwsh|iex)\b",
        weight: 60,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "CMD-02",
        category: FindingCategory::CommandExecution,
        title: "PowerShell encoded command",
        pattern: r"(?i)\b(powershell|pwsh)(\.exe)?\b[^\n]{0,30}\s-(e|ec|enc|encodedcommand)\b",
        weight: 60,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "CMD-03",
        category: FindingCategory::CommandExecution,
        title: "Destructive or fetching command",
        pattern: r"(?i)(\brm\s+-(rf|fr)\b|\bdel\s+/f\b|\bformat\s+[a-z]:|\b(curl|wget)\s+https?://|\binvoke-webrequest\b)",
        weight: 8,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "CMD-04",
        category: FindingCategory::CommandExecution,
        title: "Shell execution request",
        pattern: r"(?i)\b(exec|execute|run)\s+(?:[\w'-]+\s+){0,2}?(shell|terminal|powershell|bash)\b",
        weight: 7,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    // Structural anomalies
    RuleSpec {
        id: "STR-01",
        category: FindingCategory::StructuralAnomaly,
        title: "Instruction hidden in comment",
        pattern: r"(?is)<!--.{0,400}?\b(ignore|instructions?|system\s+prompt|assistant|you\s+must)\b.{0,400}?-->",
        weight: 30,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "STR-02",
        category: FindingCategory::StructuralAnomaly,
        title: "Invisible or bidi control character",
        pattern: r"[\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}\x{202A}-\x{202E}\x{2066}-\x{2069}]",
        weight: 40,
        hard_fail: true,
        target: Target::Document,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "STR-03",
        category: FindingCategory::StructuralAnomaly,
        title: "Header block repeated mid-body",
        pattern: r"(?m)^---[ \t]*\r?\n(name|description)[ \t]*:",
        weight: 30,
        hard_fail: false,
        target: Target::Body,
        confirm: Confirm::Match,
    },
    RuleSpec {
        id: "STR-04",
        category: FindingCategory::StructuralAnomaly,
        title: "Chat role markup",
        pattern: r"(?i)(<\|?\s*/?\s*(system|im_start|im_end)\s*\|?>|\[/?INST\])",
        weight: 35,
        hard_fail: false,
        target: Target::Document,
        confirm: Confirm::Match,
    },
];

/// A rule paired with its compiled matcher.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub spec: RuleSpec,
    pub regex: Regex,
}

/// The rule table compiled for one run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile every rule in `specs`.
    ///
    /// Any pattern that fails to compile fails the whole set, so no bundle
    /// is ever scanned with a partial table.
    pub fn compile(specs: &[RuleSpec]) -> Result<Self, IntakeError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            let regex = Regex::new(spec.pattern).map_err(|e| {
                IntakeError::ScannerConfig(format!("rule {} has an invalid pattern: {e}", spec.id))
            })?;
            rules.push(CompiledRule { spec: *spec, regex });
        }
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self, IntakeError> {
        Self::compile(RULES)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }
}
