//! LDAP controls
//!
//! `Control ::= SEQUENCE { controlType LDAPOID, criticality BOOLEAN
//! DEFAULT FALSE, controlValue OCTET STRING OPTIONAL }`

use ldap_asn1::ber::{BerEncoder, Element, Tag};
use ldap_core::{LdapError, LdapResult};

/// One request or response control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    oid: String,
    criticality: bool,
    value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            criticality: false,
            value: None,
        }
    }

    pub fn with_criticality(mut self, criticality: bool) -> Self {
        self.criticality = criticality;
        self
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn criticality(&self) -> bool {
        self.criticality
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Encode into `encoder`; a false criticality is omitted (DEFAULT FALSE)
    pub fn encode(&self, encoder: &mut BerEncoder) {
        encoder.sequence(|control| {
            control.octet_string(self.oid.as_bytes());
            if self.criticality {
                control.boolean(true);
            }
            if let Some(value) = &self.value {
                control.octet_string(value);
            }
        });
    }

    /// Decode from one control SEQUENCE element
    pub fn decode(element: &Element) -> LdapResult<Self> {
        if element.tag() != Tag::SEQUENCE {
            return Err(LdapError::Decode(format!(
                "Control must be a SEQUENCE, got {:?}",
                element.tag()
            )));
        }
        let oid = element
            .child(0)
            .ok_or_else(|| LdapError::Decode("Control missing controlType".to_string()))?
            .as_string()?;

        let mut control = Control::new(oid);
        for child in &element.children()[1..] {
            if child.tag() == Tag::BOOLEAN {
                control.criticality = child.as_boolean()?;
            } else if child.tag() == Tag::OCTET_STRING {
                control.value = Some(child.as_octet_string()?.to_vec());
            } else {
                return Err(LdapError::Decode(format!(
                    "Unexpected element in control: {:?}",
                    child.tag()
                )));
            }
        }
        Ok(control)
    }
}
