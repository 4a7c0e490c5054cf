//! Access-control codes
//!
//! An access code packs memory level, sensitivity and restriction controls into
//! one fixed-grammar value:
//!
//! ```text
//! MEM:ST | SEC:4-PERS | AI:LOC | EXP:NO | VIS:USER
//! ```
//!
//! Other subsystems match on the string form, so [`AccessCode`]'s `Display`
//! output and [`parse`] are the only serializer and parser.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Control, MemoryLevel, RestrictionMode, ScopeGroup, Sensitivity, Visibility};

/// Separator between the five sub-codes
pub const SEPARATOR: &str = " | ";

/// Sensitivity level at or above which AI use is always denied
pub const AI_VETO_LEVEL: u8 = 8;

/// Sensitivity level at or above which `user` visibility forces the PERS scope
pub const PERSONAL_SCOPE_LEVEL: u8 = 3;

/// MEM sub-code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemCode {
    Transitory,
    Temporary,
    ShortTerm,
    LongTerm,
    Canonical,
    Archived,
    Unknown,
}

impl MemCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemCode::Transitory => "TR",
            MemCode::Temporary => "TMP",
            MemCode::ShortTerm => "ST",
            MemCode::LongTerm => "LT",
            MemCode::Canonical => "CN",
            MemCode::Archived => "AR",
            MemCode::Unknown => "UNK",
        }
    }

    fn from_code(s: &str) -> Option<Self> {
        Some(match s {
            "TR" => MemCode::Transitory,
            "TMP" => MemCode::Temporary,
            "ST" => MemCode::ShortTerm,
            "LT" => MemCode::LongTerm,
            "CN" => MemCode::Canonical,
            "AR" => MemCode::Archived,
            "UNK" => MemCode::Unknown,
            _ => return None,
        })
    }
}

impl From<MemoryLevel> for MemCode {
    fn from(level: MemoryLevel) -> Self {
        match level {
            MemoryLevel::Transitory => MemCode::Transitory,
            MemoryLevel::Temporary => MemCode::Temporary,
            MemoryLevel::ShortTerm => MemCode::ShortTerm,
            MemoryLevel::LongTerm => MemCode::LongTerm,
            MemoryLevel::Canonical => MemCode::Canonical,
            MemoryLevel::Archived => MemCode::Archived,
        }
    }
}

/// Scope part of the SEC sub-code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeCode {
    Public,
    Shareable,
    Internal,
    Secret,
    Compartmentalized,
    General,
    Personal,
}

impl ScopeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeCode::Public => "PUB",
            ScopeCode::Shareable => "SHR",
            ScopeCode::Internal => "INT",
            ScopeCode::Secret => "SEC",
            ScopeCode::Compartmentalized => "CMP",
            ScopeCode::General => "GEN",
            ScopeCode::Personal => "PERS",
        }
    }

    fn from_code(s: &str) -> Option<Self> {
        Some(match s {
            "PUB" => ScopeCode::Public,
            "SHR" => ScopeCode::Shareable,
            "INT" => ScopeCode::Internal,
            "SEC" => ScopeCode::Secret,
            "CMP" => ScopeCode::Compartmentalized,
            "GEN" => ScopeCode::General,
            "PERS" => ScopeCode::Personal,
            _ => return None,
        })
    }
}

impl From<ScopeGroup> for ScopeCode {
    fn from(scope: ScopeGroup) -> Self {
        match scope {
            ScopeGroup::PublicGroup => ScopeCode::Public,
            ScopeGroup::ShareableGroup => ScopeCode::Shareable,
            ScopeGroup::InternalGroup => ScopeCode::Internal,
            ScopeGroup::SecretGroup => ScopeCode::Secret,
            ScopeGroup::CompartmentalizedGroup => ScopeCode::Compartmentalized,
        }
    }
}

/// SEC sub-code: sensitivity level plus scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecCode {
    pub level: u8,
    pub scope: ScopeCode,
}

/// AI sub-code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiCode {
    /// No AI processing at all
    None,
    /// Metadata (title) only
    Meta,
    /// Local models only
    Local,
    /// Local models only, cautious mode
    LocalCautious,
    Full,
}

impl AiCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiCode::None => "NONE",
            AiCode::Meta => "META",
            AiCode::Local => "LOC",
            AiCode::LocalCautious => "LOC-C",
            AiCode::Full => "FULL",
        }
    }

    fn from_code(s: &str) -> Option<Self> {
        Some(match s {
            "NONE" => AiCode::None,
            "META" => AiCode::Meta,
            "LOC" => AiCode::Local,
            "LOC-C" => AiCode::LocalCautious,
            "FULL" => AiCode::Full,
            _ => return None,
        })
    }

    pub fn is_local_only(&self) -> bool {
        matches!(self, AiCode::Local | AiCode::LocalCautious)
    }
}

/// VIS sub-code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisCode {
    Public,
    Group,
    Internal,
    User,
    Restricted,
    Unknown,
}

impl VisCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisCode::Public => "PUB",
            VisCode::Group => "GRP",
            VisCode::Internal => "INT",
            VisCode::User => "USER",
            VisCode::Restricted => "RST",
            VisCode::Unknown => "UNK",
        }
    }

    fn from_code(s: &str) -> Option<Self> {
        Some(match s {
            "PUB" => VisCode::Public,
            "GRP" => VisCode::Group,
            "INT" => VisCode::Internal,
            "USER" => VisCode::User,
            "RST" => VisCode::Restricted,
            "UNK" => VisCode::Unknown,
            _ => return None,
        })
    }
}

/// Structured access-control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessCode {
    pub mem: MemCode,
    pub sec: SecCode,
    pub ai: AiCode,
    pub export: bool,
    pub vis: VisCode,
}

impl AccessCode {
    /// Whether AI processing is permitted.
    ///
    /// NONE and META never allow it. With `require_cloud`, the local-only
    /// codes are refused too.
    pub fn can_use_for_ai(&self, require_cloud: bool) -> bool {
        match self.ai {
            AiCode::None | AiCode::Meta => false,
            AiCode::Local | AiCode::LocalCautious => !require_cloud,
            AiCode::Full => true,
        }
    }

    pub fn can_export(&self) -> bool {
        self.export
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MEM:{mem}{sep}SEC:{level}-{scope}{sep}AI:{ai}{sep}EXP:{exp}{sep}VIS:{vis}",
            mem = self.mem.as_str(),
            level = self.sec.level,
            scope = self.sec.scope.as_str(),
            ai = self.ai.as_str(),
            exp = if self.export { "YES" } else { "NO" },
            vis = self.vis.as_str(),
            sep = SEPARATOR,
        )
    }
}

impl FromStr for AccessCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).ok_or_else(|| format!("Malformed access code: {}", s))
    }
}

impl Serialize for AccessCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccessCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the access code for the given memory level, sensitivity and control
pub fn compute(
    memory_level: MemoryLevel,
    sensitivity: &Sensitivity,
    control: Option<&Control>,
) -> AccessCode {
    let level = sensitivity.level.value();
    let mode = control.and_then(|c| c.restriction_mode);

    // Personal readability override: the original scope is discarded.
    let scope = if sensitivity.visibility == Visibility::User && level >= PERSONAL_SCOPE_LEVEL {
        ScopeCode::Personal
    } else {
        sensitivity
            .scope
            .map(ScopeCode::from)
            .unwrap_or(ScopeCode::General)
    };

    let privacy = &sensitivity.privacy;
    let ai = if level >= AI_VETO_LEVEL || (!privacy.cloud_ai_allowed && !privacy.local_ai_allowed)
    {
        AiCode::None
    } else if mode == Some(RestrictionMode::Hardened) {
        AiCode::Meta
    } else if !privacy.cloud_ai_allowed && privacy.local_ai_allowed {
        if mode == Some(RestrictionMode::Cautious) {
            AiCode::LocalCautious
        } else {
            AiCode::Local
        }
    } else {
        AiCode::Full
    };

    let vis = match sensitivity.visibility {
        Visibility::Public => VisCode::Public,
        Visibility::Internal if !sensitivity.group_access.is_empty() => VisCode::Group,
        Visibility::Internal => VisCode::Internal,
        Visibility::User => VisCode::User,
        Visibility::Restricted => VisCode::Restricted,
    };

    AccessCode {
        mem: memory_level.into(),
        sec: SecCode { level, scope },
        ai,
        export: privacy.export_allowed,
        vis,
    }
}

/// Parse a code string; `None` when it does not match the grammar
pub fn parse(code: &str) -> Option<AccessCode> {
    let mut parts = code.split(SEPARATOR);

    let mem = MemCode::from_code(parts.next()?.strip_prefix("MEM:")?)?;

    let (level, scope) = parts.next()?.strip_prefix("SEC:")?.split_once('-')?;
    if level.len() != 1 {
        return None;
    }
    let level = level.chars().next()?.to_digit(10)? as u8;
    let scope = ScopeCode::from_code(scope)?;

    let ai = AiCode::from_code(parts.next()?.strip_prefix("AI:")?)?;

    let export = match parts.next()?.strip_prefix("EXP:")? {
        "YES" => true,
        "NO" => false,
        _ => return None,
    };

    let vis = VisCode::from_code(parts.next()?.strip_prefix("VIS:")?)?;

    if parts.next().is_some() {
        return None;
    }

    Some(AccessCode {
        mem,
        sec: SecCode { level, scope },
        ai,
        export,
        vis,
    })
}

/// String-level AI check; malformed codes are never usable
pub fn can_use_for_ai(code: &str, require_cloud: bool) -> bool {
    parse(code).is_some_and(|c| c.can_use_for_ai(require_cloud))
}

/// String-level export check; malformed codes are never exportable
pub fn can_export(code: &str) -> bool {
    parse(code).is_some_and(|c| c.can_export())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrivacyFlags, SensitivityLevel};

    fn sensitivity(
        level: u8,
        cloud: bool,
        local: bool,
        export: bool,
        vis: Visibility,
    ) -> Sensitivity {
        Sensitivity {
            level: SensitivityLevel::new(level).unwrap(),
            scope: None,
            privacy: PrivacyFlags {
                cloud_ai_allowed: cloud,
                local_ai_allowed: local,
                export_allowed: export,
            },
            visibility: vis,
            group_access: Vec::new(),
        }
    }

    fn control(mode: RestrictionMode) -> Control {
        Control {
            restriction_mode: Some(mode),
            ..Default::default()
        }
    }

    #[test]
    fn test_personal_local_only_code() {
        let s = sensitivity(4, false, true, false, Visibility::User);
        let code = compute(MemoryLevel::ShortTerm, &s, None);
        assert_eq!(
            code.to_string(),
            "MEM:ST | SEC:4-PERS | AI:LOC | EXP:NO | VIS:USER"
        );
    }

    #[test]
    fn test_level_veto_overrides_privacy() {
        let s = sensitivity(9, true, true, true, Visibility::Public);
        let code = compute(MemoryLevel::Transitory, &s, None);
        assert_eq!(code.ai, AiCode::None);
        assert!(code.to_string().contains("AI:NONE"));
    }

    #[test]
    fn test_both_ai_disallowed_is_none() {
        let s = sensitivity(2, false, false, true, Visibility::Public);
        assert_eq!(compute(MemoryLevel::Temporary, &s, None).ai, AiCode::None);
    }

    #[test]
    fn test_hardened_suppresses_local_codes() {
        let s = sensitivity(2, false, true, true, Visibility::Public);
        let code = compute(MemoryLevel::Temporary, &s, Some(&control(RestrictionMode::Hardened)));
        assert_eq!(code.ai, AiCode::Meta);
    }

    #[test]
    fn test_cautious_local_code() {
        let s = sensitivity(2, false, true, true, Visibility::Public);
        let code = compute(MemoryLevel::Temporary, &s, Some(&control(RestrictionMode::Cautious)));
        assert_eq!(code.ai, AiCode::LocalCautious);
        assert!(code.to_string().contains("AI:LOC-C"));
    }

    #[test]
    fn test_cautious_with_cloud_allowed_is_full() {
        let s = sensitivity(2, true, true, true, Visibility::Public);
        let code = compute(MemoryLevel::Temporary, &s, Some(&control(RestrictionMode::Cautious)));
        assert_eq!(code.ai, AiCode::Full);
    }

    #[test]
    fn test_scope_codes() {
        let mut s = sensitivity(1, true, true, true, Visibility::Public);
        assert_eq!(compute(MemoryLevel::Canonical, &s, None).sec.scope, ScopeCode::General);

        s.scope = Some(ScopeGroup::SecretGroup);
        assert_eq!(compute(MemoryLevel::Canonical, &s, None).sec.scope, ScopeCode::Secret);

        // user visibility below the threshold keeps the scope
        s.visibility = Visibility::User;
        s.level = SensitivityLevel::new(2).unwrap();
        assert_eq!(compute(MemoryLevel::Canonical, &s, None).sec.scope, ScopeCode::Secret);

        s.level = SensitivityLevel::new(3).unwrap();
        assert_eq!(compute(MemoryLevel::Canonical, &s, None).sec.scope, ScopeCode::Personal);
    }

    #[test]
    fn test_visibility_codes() {
        let mut s = sensitivity(1, true, true, true, Visibility::Internal);
        assert_eq!(compute(MemoryLevel::LongTerm, &s, None).vis, VisCode::Internal);

        s.group_access = vec!["research".to_string()];
        assert_eq!(compute(MemoryLevel::LongTerm, &s, None).vis, VisCode::Group);

        s.visibility = Visibility::Restricted;
        assert_eq!(compute(MemoryLevel::LongTerm, &s, None).vis, VisCode::Restricted);
    }

    #[test]
    fn test_parse_round_trip_all_levels() {
        let s = sensitivity(5, true, false, false, Visibility::Internal);
        for level in MemoryLevel::ALL {
            let code = compute(level, &s, None);
            assert_eq!(parse(&code.to_string()), Some(code));
        }
    }

    #[test]
    fn test_parse_unknown_codes() {
        let code = parse("MEM:UNK | SEC:0-GEN | AI:FULL | EXP:YES | VIS:UNK").unwrap();
        assert_eq!(code.mem, MemCode::Unknown);
        assert_eq!(code.vis, VisCode::Unknown);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("").is_none());
        assert!(parse("MEM:ST|SEC:4-PERS|AI:LOC|EXP:NO|VIS:USER").is_none());
        assert!(parse("MEM:ST | SEC:10-GEN | AI:LOC | EXP:NO | VIS:USER").is_none());
        assert!(parse("MEM:ST | SEC:4-GEN | AI:MAYBE | EXP:NO | VIS:USER").is_none());
        assert!(parse("MEM:ST | SEC:4-GEN | AI:LOC | EXP:NO | VIS:USER | X:1").is_none());
        assert!(parse("SEC:4-GEN | MEM:ST | AI:LOC | EXP:NO | VIS:USER").is_none());
    }

    #[test]
    fn test_can_use_for_ai() {
        assert!(!can_use_for_ai("MEM:ST | SEC:1-GEN | AI:NONE | EXP:YES | VIS:PUB", false));
        assert!(!can_use_for_ai("MEM:ST | SEC:1-GEN | AI:META | EXP:YES | VIS:PUB", false));
        assert!(can_use_for_ai("MEM:ST | SEC:1-GEN | AI:LOC | EXP:YES | VIS:PUB", false));
        assert!(!can_use_for_ai("MEM:ST | SEC:1-GEN | AI:LOC-C | EXP:YES | VIS:PUB", true));
        assert!(can_use_for_ai("MEM:ST | SEC:1-GEN | AI:FULL | EXP:YES | VIS:PUB", true));
        assert!(!can_use_for_ai("garbage", false));
    }

    #[test]
    fn test_can_export() {
        assert!(can_export("MEM:ST | SEC:1-GEN | AI:FULL | EXP:YES | VIS:PUB"));
        assert!(!can_export("MEM:ST | SEC:1-GEN | AI:FULL | EXP:NO | VIS:PUB"));
        assert!(!can_export("EXP:YES"));
    }

    #[test]
    fn test_serde_uses_wire_format() {
        let s = sensitivity(4, false, true, false, Visibility::User);
        let code = compute(MemoryLevel::ShortTerm, &s, None);
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"MEM:ST | SEC:4-PERS | AI:LOC | EXP:NO | VIS:USER\"");
        let back: AccessCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
