//! Path-dispatched PDU decoding
//!
//! A [`PduDecoder`] holds handlers registered against [`DerPath`]es.
//! One `decode` call parses the buffer into an element tree and walks
//! it with a path cursor; every handler whose path matches the
//! cursor's position receives the current element and assigns a typed
//! value onto the target. Elements no handler addresses are skipped
//! without error so servers may send fields this client does not know.

use crate::ber::element::Element;
use crate::ber::path::DerPath;
use crate::ber::types::Tag;
use ldap_core::LdapResult;

/// Handler invoked with the target object and the matched element
pub type ParseHandler<T> = Box<dyn Fn(&mut T, &Element) -> LdapResult<()> + Send + Sync>;

/// Decoder dispatching tree positions to registered handlers
pub struct PduDecoder<T> {
    handlers: Vec<(DerPath, ParseHandler<T>)>,
}

impl<T> PduDecoder<T> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler for every element matching `path`
    ///
    /// Registration order is preserved: when several handlers match
    /// the same element they fire in the order they were registered.
    pub fn register(
        &mut self,
        path: DerPath,
        handler: impl Fn(&mut T, &Element) -> LdapResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.handlers.push((path, Box::new(handler)));
        self
    }

    /// Parse `data` and dispatch matching elements onto `target`
    ///
    /// # Errors
    /// `Decode` if the buffer is not a single well-formed element, or
    /// whatever error a fired handler returns.
    pub fn decode(&self, data: &[u8], target: &mut T) -> LdapResult<()> {
        let root = Element::parse_exact(data)?;
        self.decode_element(&root, target)
    }

    /// Dispatch over an already-parsed element tree
    pub fn decode_element(&self, root: &Element, target: &mut T) -> LdapResult<()> {
        let mut cursor: Vec<(Tag, usize)> = Vec::new();
        self.walk(root, 0, &mut cursor, target)
    }

    fn walk(
        &self,
        element: &Element,
        position: usize,
        cursor: &mut Vec<(Tag, usize)>,
        target: &mut T,
    ) -> LdapResult<()> {
        cursor.push((element.tag(), position));
        for (path, handler) in &self.handlers {
            if path.matches(cursor) {
                handler(target, element)?;
            }
        }
        for (i, child) in element.children().iter().enumerate() {
            self.walk(child, i, cursor, target)?;
        }
        cursor.pop();
        Ok(())
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<T> Default for PduDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::encoder::BerEncoder;

    #[derive(Default)]
    struct DoneResult {
        code: i64,
        matched_dn: String,
        diagnostic: String,
        referrals: Vec<String>,
        fires: usize,
    }

    /// SearchResultDone with the given fields, wrapped in a message
    /// envelope (message id 7)
    fn search_done(code: i64, dn: &str, diag: &str, referrals: &[&str]) -> Vec<u8> {
        let mut enc = BerEncoder::new();
        enc.sequence(|msg| {
            msg.integer(7);
            msg.constructed(Tag::application(true, 5), |op| {
                op.enumerated(code);
                op.octet_string(dn.as_bytes());
                op.octet_string(diag.as_bytes());
                if !referrals.is_empty() {
                    op.constructed(Tag::context(true, 3), |refs| {
                        for url in referrals {
                            refs.octet_string(url.as_bytes());
                        }
                    });
                }
            });
        });
        enc.into_bytes()
    }

    fn result_decoder() -> PduDecoder<DoneResult> {
        let mut decoder = PduDecoder::new();
        decoder
            .register("/SEQ/APP(5)/ENUM[0]".parse().unwrap(), |r: &mut DoneResult, e| {
                r.code = e.as_enumerated()?;
                r.fires += 1;
                Ok(())
            })
            .register("/SEQ/APP(5)/OCTSTR[1]".parse().unwrap(), |r, e| {
                r.matched_dn = e.as_string()?;
                r.fires += 1;
                Ok(())
            })
            .register("/SEQ/APP(5)/OCTSTR[2]".parse().unwrap(), |r, e| {
                r.diagnostic = e.as_string()?;
                r.fires += 1;
                Ok(())
            })
            .register(
                "/SEQ/APP(5)/CTX(3)/OCTSTR".parse().unwrap(),
                |r, e| {
                    r.referrals.push(e.as_string()?);
                    r.fires += 1;
                    Ok(())
                },
            );
        decoder
    }

    #[test]
    fn test_each_handler_fires_exactly_once() {
        let buffer = search_done(32, "dc=example,dc=com", "No such object", &[]);
        let mut result = DoneResult::default();
        result_decoder().decode(&buffer, &mut result).unwrap();

        assert_eq!(result.fires, 3);
        assert_eq!(result.code, 32);
        assert_eq!(result.matched_dn, "dc=example,dc=com");
        assert_eq!(result.diagnostic, "No such object");
        assert!(result.referrals.is_empty());
    }

    #[test]
    fn test_success_with_empty_fields() {
        let buffer = search_done(0, "", "", &[]);
        let mut result = DoneResult::default();
        result_decoder().decode(&buffer, &mut result).unwrap();

        assert_eq!(result.code, 0);
        assert_eq!(result.matched_dn, "");
        assert_eq!(result.diagnostic, "");
        assert!(result.referrals.is_empty());
    }

    #[test]
    fn test_referral_handler_fires_per_url() {
        let buffer = search_done(
            10,
            "",
            "",
            &["ldap://alt1.example.com", "ldap://alt2.example.com"],
        );
        let mut result = DoneResult::default();
        result_decoder().decode(&buffer, &mut result).unwrap();

        assert_eq!(
            result.referrals,
            ["ldap://alt1.example.com", "ldap://alt2.example.com"]
        );
    }

    #[test]
    fn test_unmatched_elements_skipped() {
        // A BindResponse-shaped op under APP(1): no registered path
        // matches, decode still succeeds.
        let mut enc = BerEncoder::new();
        enc.sequence(|msg| {
            msg.integer(3);
            msg.constructed(Tag::application(true, 1), |op| {
                op.enumerated(0);
                op.octet_string(b"");
                op.octet_string(b"");
            });
        });
        let mut result = DoneResult::default();
        result_decoder().decode(enc.as_bytes(), &mut result).unwrap();
        assert_eq!(result.fires, 0);
    }

    #[test]
    fn test_handler_error_propagates() {
        // Diagnostic field holds invalid UTF-8
        let mut enc = BerEncoder::new();
        enc.sequence(|msg| {
            msg.integer(7);
            msg.constructed(Tag::application(true, 5), |op| {
                op.enumerated(0);
                op.octet_string(b"");
                op.octet_string(&[0xFF, 0xFE]);
            });
        });
        let mut result = DoneResult::default();
        assert!(result_decoder().decode(enc.as_bytes(), &mut result).is_err());
    }
}
