//! # Module SOAP
//!
//! Codec SOAP 1.1 / 1.2 de la binding.
//!
//! ## Fonctionnalités
//!
//! - ✅ Lecture en flux d'une enveloppe (headers, body, fault)
//! - ✅ Détection de la version par namespace et `Content-Type`
//! - ✅ Écriture déterministe des enveloppes et des faults
//! - ✅ Traduction des codes de fault entre SOAP 1.1 et 1.2
//!
//! ## Architecture
//!
//! - [`SoapVersion`] : namespace d'enveloppe et type de contenu
//! - [`SoapMessage`] : enveloppe lue ou à écrire
//! - [`SoapFault`] : fault SOAP, codes normalisés sur SOAP 1.2
//! - [`read_soap`] : parser en flux (quick-xml)

mod builder;
mod envelope;
mod fault;
mod parser;

use std::fmt;

pub use envelope::SoapMessage;
pub use fault::{SoapFault, fault_codes};
pub use parser::read_soap;

pub const SOAP11_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Header HTTP portant l'action SOAP 1.1.
pub const SOAP_ACTION_HEADER: &str = "SOAPAction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapVersion {
    #[default]
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn envelope_namespace(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_ENV_NS,
            SoapVersion::Soap12 => SOAP12_ENV_NS,
        }
    }

    /// Media type of an envelope of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "text/xml",
            SoapVersion::Soap12 => "application/soap+xml",
        }
    }

    /// Prefix used when writing an envelope from scratch.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "soapenv",
            SoapVersion::Soap12 => "soap",
        }
    }

    pub fn from_namespace(ns: &str) -> Option<SoapVersion> {
        match ns {
            SOAP11_ENV_NS => Some(SoapVersion::Soap11),
            SOAP12_ENV_NS => Some(SoapVersion::Soap12),
            _ => None,
        }
    }

    /// Version announced by a `Content-Type` header, parameters ignored.
    pub fn from_content_type(content_type: &str) -> Option<SoapVersion> {
        let media = content_type.split(';').next()?.trim().to_ascii_lowercase();
        match media.as_str() {
            "text/xml" => Some(SoapVersion::Soap11),
            "application/soap+xml" => Some(SoapVersion::Soap12),
            _ => None,
        }
    }

    /// `"1.1"` / `"1.2"` (also `soap11` / `soap12`), as found in configuration.
    pub fn parse(s: &str) -> Option<SoapVersion> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1.1" | "soap11" | "soap1.1" => Some(SoapVersion::Soap11),
            "1.2" | "soap12" | "soap1.2" => Some(SoapVersion::Soap12),
            _ => None,
        }
    }
}

impl fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoapVersion::Soap11 => f.write_str("SOAP 1.1"),
            SoapVersion::Soap12 => f.write_str("SOAP 1.2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_content_type() {
        assert_eq!(
            SoapVersion::from_content_type("text/xml; charset=utf-8"),
            Some(SoapVersion::Soap11)
        );
        assert_eq!(
            SoapVersion::from_content_type("application/soap+xml;action=\"urn:x\""),
            Some(SoapVersion::Soap12)
        );
        assert_eq!(SoapVersion::from_content_type("application/json"), None);
    }

    #[test]
    fn test_version_from_configuration() {
        assert_eq!(SoapVersion::parse("1.2"), Some(SoapVersion::Soap12));
        assert_eq!(SoapVersion::parse("SOAP11"), Some(SoapVersion::Soap11));
        assert_eq!(SoapVersion::parse("2.0"), None);
    }
}
