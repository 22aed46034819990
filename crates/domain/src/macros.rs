//! Macro for implementing Display and FromStr for configuration enums
//!
//! Configuration enums are read from files through serde and from
//! environment overrides as plain strings. This macro keeps both spellings
//! in one place: case-insensitive parsing and a consistent lowercase
//! representation.
//!
//! # Example
//!
//! ```rust
//! use conduit_domain::impl_domain_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Delivery {
//!     AtMostOnce,
//!     AtLeastOnce,
//! }
//!
//! impl_domain_enum_conversions!(Delivery {
//!     AtMostOnce => "at_most_once",
//!     AtLeastOnce => "at_least_once",
//! });
//! ```

/// Implements Display and FromStr traits for configuration enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase string
///   representations
#[macro_export]
macro_rules! impl_domain_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::core::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                match self {
                    $(Self::$variant => ::core::write!(f, $str),)+
                }
            }
        }

        impl ::core::str::FromStr for $enum_name {
            type Err = $crate::ConduitError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => ::core::result::Result::Ok(Self::$variant),)+
                    _ => ::core::result::Result::Err($crate::ConduitError::InvalidInput(
                        ::std::format!("Invalid {}: {}", ::core::stringify!($enum_name), s),
                    )),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{AckDecision, BackoffKind, LogFormat};

    #[test]
    fn test_display_conversion() {
        assert_eq!(AckDecision::Ack.to_string(), "ack");
        assert_eq!(AckDecision::NackRequeue.to_string(), "nack_requeue");
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(BackoffKind::Exponential.to_string(), "exponential");
    }

    #[test]
    fn test_fromstr_case_insensitive() {
        assert_eq!(AckDecision::from_str("NACK_DISCARD").unwrap(), AckDecision::NackDiscard);
        assert_eq!(LogFormat::from_str(" Pretty ").unwrap(), LogFormat::Pretty);
        assert_eq!(BackoffKind::from_str("Linear").unwrap(), BackoffKind::Linear);
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = LogFormat::from_str("xml").unwrap_err();
        assert!(err.to_string().contains("Invalid LogFormat: xml"));
    }

    mod shadowed_result {
        // Single-parameter alias, as crates commonly define.
        #[allow(dead_code)]
        type Result<T> = std::result::Result<T, crate::ConduitError>;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Lane {
            Fast,
            Slow,
        }

        crate::impl_domain_enum_conversions!(Lane {
            Fast => "fast",
            Slow => "slow",
        });
    }

    #[test]
    fn test_expands_beside_result_alias() {
        use shadowed_result::Lane;

        assert_eq!(Lane::from_str("SLOW").unwrap(), Lane::Slow);
        assert_eq!(Lane::Fast.to_string(), "fast");
        assert!(Lane::from_str("medium").is_err());
    }

    #[test]
    fn test_roundtrip() {
        for decision in [AckDecision::Ack, AckDecision::NackRequeue, AckDecision::NackDiscard] {
            let parsed = AckDecision::from_str(&decision.to_string()).unwrap();
            assert_eq!(decision, parsed);
        }
    }
}
