//! Response decoding
//!
//! Every response shape registers handlers against the DER paths of
//! its fields and lets the path dispatcher walk the envelope tree.
//! Fields the server omits keep their defaults; elements the client
//! does not know are skipped.

use crate::controls::Control;
use crate::message::{Envelope, op_tag};
use crate::oid;
use ldap_core::{LdapError, LdapResult, ResultCode};
use ldap_asn1::ber::{DerPath, PathStep, PduDecoder, StepKind};

fn op_path(op: u32, tail: &[PathStep]) -> DerPath {
    let mut steps = vec![
        PathStep::new(StepKind::Seq, None),
        PathStep::new(StepKind::App(op), None),
    ];
    steps.extend_from_slice(tail);
    DerPath::new(steps)
}

/// The LDAPResult fields shared by every terminal response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResponse {
    result_code: ResultCode,
    matched_dn: String,
    diagnostic_message: String,
    referral_urls: Vec<String>,
    controls: Vec<Control>,
}

impl Default for LdapResponse {
    fn default() -> Self {
        Self {
            result_code: ResultCode::Success,
            matched_dn: String::new(),
            diagnostic_message: String::new(),
            referral_urls: Vec::new(),
            controls: Vec::new(),
        }
    }
}

/// Accumulator the path handlers write into
#[derive(Default)]
struct ResultFields {
    code: Option<i64>,
    matched_dn: String,
    diagnostic_message: String,
    referral_urls: Vec<String>,
}

fn result_decoder(op: u32) -> PduDecoder<ResultFields> {
    let mut decoder = PduDecoder::new();
    decoder
        .register(
            op_path(op, &[PathStep::new(StepKind::Enum, Some(0))]),
            |fields: &mut ResultFields, e| {
                fields.code = Some(e.as_enumerated()?);
                Ok(())
            },
        )
        .register(
            op_path(op, &[PathStep::new(StepKind::OctStr, Some(1))]),
            |fields, e| {
                fields.matched_dn = e.as_string()?;
                Ok(())
            },
        )
        .register(
            op_path(op, &[PathStep::new(StepKind::OctStr, Some(2))]),
            |fields, e| {
                fields.diagnostic_message = e.as_string()?;
                Ok(())
            },
        )
        .register(
            op_path(
                op,
                &[
                    PathStep::new(StepKind::Ctx(3), None),
                    PathStep::new(StepKind::OctStr, None),
                ],
            ),
            |fields, e| {
                fields.referral_urls.push(e.as_string()?);
                Ok(())
            },
        );
    decoder
}

impl LdapResponse {
    /// Decode the LDAPResult fields from a terminal response envelope
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        let mut fields = ResultFields::default();
        result_decoder(envelope.op_tag()).decode_element(envelope.root(), &mut fields)?;

        let code = fields
            .code
            .ok_or_else(|| LdapError::Decode("Response missing result code".to_string()))?;
        if !(0..=u32::MAX as i64).contains(&code) {
            return Err(LdapError::Decode(format!(
                "Result code out of range: {}",
                code
            )));
        }

        Ok(Self {
            result_code: ResultCode::from_u32(code as u32),
            matched_dn: fields.matched_dn,
            diagnostic_message: fields.diagnostic_message,
            referral_urls: fields.referral_urls,
            controls: envelope.controls()?,
        })
    }

    pub fn result_code(&self) -> ResultCode {
        self.result_code
    }

    pub fn matched_dn(&self) -> &str {
        &self.matched_dn
    }

    pub fn diagnostic_message(&self) -> &str {
        &self.diagnostic_message
    }

    pub fn referral_urls(&self) -> &[String] {
        &self.referral_urls
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

/// One attribute of a search result entry
///
/// Values are kept as raw octets; directory attributes may be binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn string_values(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }
}

/// SearchResultEntry (`[APPLICATION 4]`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResultEntry {
    object_name: String,
    attributes: Vec<Attribute>,
}

impl SearchResultEntry {
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        let op = op_tag::SEARCH_RESULT_ENTRY;
        let mut decoder = PduDecoder::new();
        decoder
            .register(
                op_path(op, &[PathStep::new(StepKind::OctStr, Some(0))]),
                |entry: &mut SearchResultEntry, e| {
                    entry.object_name = e.as_string()?;
                    Ok(())
                },
            )
            .register(
                op_path(
                    op,
                    &[
                        PathStep::new(StepKind::Seq, None),
                        PathStep::new(StepKind::Seq, None),
                        PathStep::new(StepKind::OctStr, Some(0)),
                    ],
                ),
                |entry, e| {
                    entry.attributes.push(Attribute::new(e.as_string()?));
                    Ok(())
                },
            )
            .register(
                op_path(
                    op,
                    &[
                        PathStep::new(StepKind::Seq, None),
                        PathStep::new(StepKind::Seq, None),
                        PathStep::new(StepKind::Set, None),
                        PathStep::new(StepKind::OctStr, None),
                    ],
                ),
                |entry, e| {
                    let attribute = entry.attributes.last_mut().ok_or_else(|| {
                        LdapError::Decode("Attribute value before attribute type".to_string())
                    })?;
                    attribute.values.push(e.as_octet_string()?.to_vec());
                    Ok(())
                },
            );

        let mut entry = SearchResultEntry::default();
        decoder.decode_element(envelope.root(), &mut entry)?;
        Ok(entry)
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// SearchResultReference (`[APPLICATION 19]`): continuation URIs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResultReference {
    uris: Vec<String>,
}

impl SearchResultReference {
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        let mut decoder = PduDecoder::new();
        decoder.register(
            op_path(
                op_tag::SEARCH_RESULT_REFERENCE,
                &[PathStep::new(StepKind::OctStr, None)],
            ),
            |reference: &mut SearchResultReference, e| {
                reference.uris.push(e.as_string()?);
                Ok(())
            },
        );

        let mut reference = SearchResultReference::default();
        decoder.decode_element(envelope.root(), &mut reference)?;
        Ok(reference)
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }
}

/// ExtendedResponse (`[APPLICATION 24]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedResponse {
    response: LdapResponse,
    name: Option<String>,
    value: Option<Vec<u8>>,
}

#[derive(Default)]
struct ExtendedFields {
    name: Option<String>,
    value: Option<Vec<u8>>,
}

impl ExtendedResponse {
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        let response = LdapResponse::decode(envelope)?;

        let op = op_tag::EXTENDED_RESPONSE;
        let mut decoder = PduDecoder::new();
        decoder
            .register(
                op_path(op, &[PathStep::new(StepKind::Ctx(10), None)]),
                |fields: &mut ExtendedFields, e| {
                    let name = String::from_utf8(e.value().to_vec()).map_err(|err| {
                        LdapError::Decode(format!("Invalid UTF-8 in responseName: {}", err))
                    })?;
                    fields.name = Some(name);
                    Ok(())
                },
            )
            .register(
                op_path(op, &[PathStep::new(StepKind::Ctx(11), None)]),
                |fields, e| {
                    fields.value = Some(e.value().to_vec());
                    Ok(())
                },
            );

        let mut fields = ExtendedFields::default();
        decoder.decode_element(envelope.root(), &mut fields)?;

        Ok(Self {
            response,
            name: fields.name,
            value: fields.value,
        })
    }

    pub fn response(&self) -> &LdapResponse {
        &self.response
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn is_notice_of_disconnection(&self) -> bool {
        self.name.as_deref() == Some(oid::NOTICE_OF_DISCONNECTION)
    }
}

/// IntermediateResponse (`[APPLICATION 25]`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntermediateResponse {
    name: Option<String>,
    value: Option<Vec<u8>>,
}

impl IntermediateResponse {
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        let op = op_tag::INTERMEDIATE_RESPONSE;
        let mut decoder = PduDecoder::new();
        decoder
            .register(
                op_path(op, &[PathStep::new(StepKind::Ctx(0), None)]),
                |response: &mut IntermediateResponse, e| {
                    let name = String::from_utf8(e.value().to_vec()).map_err(|err| {
                        LdapError::Decode(format!("Invalid UTF-8 in responseName: {}", err))
                    })?;
                    response.name = Some(name);
                    Ok(())
                },
            )
            .register(
                op_path(op, &[PathStep::new(StepKind::Ctx(1), None)]),
                |response, e| {
                    response.value = Some(e.value().to_vec());
                    Ok(())
                },
            );

        let mut response = IntermediateResponse::default();
        decoder.decode_element(envelope.root(), &mut response)?;
        Ok(response)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

/// One decoded server-to-client message, dispatched by op tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    SearchEntry(SearchResultEntry),
    SearchReference(SearchResultReference),
    Extended(ExtendedResponse),
    Intermediate(IntermediateResponse),
    /// Any terminal response carrying the LDAPResult fields
    Result(LdapResponse),
}

impl Response {
    pub fn decode(envelope: &Envelope) -> LdapResult<Self> {
        match envelope.op_tag() {
            op_tag::SEARCH_RESULT_ENTRY => {
                Ok(Response::SearchEntry(SearchResultEntry::decode(envelope)?))
            }
            op_tag::SEARCH_RESULT_REFERENCE => Ok(Response::SearchReference(
                SearchResultReference::decode(envelope)?,
            )),
            op_tag::EXTENDED_RESPONSE => Ok(Response::Extended(ExtendedResponse::decode(envelope)?)),
            op_tag::INTERMEDIATE_RESPONSE => Ok(Response::Intermediate(
                IntermediateResponse::decode(envelope)?,
            )),
            _ => Ok(Response::Result(LdapResponse::decode(envelope)?)),
        }
    }

    /// Whether this message completes the operation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Response::Extended(_) | Response::Result(_))
    }
}

/// Collects the messages of one search operation in arrival order
#[derive(Debug, Clone)]
pub enum SearchItem {
    Entry(SearchResultEntry),
    Reference(SearchResultReference),
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    items: Vec<SearchItem>,
    done: LdapResponse,
}

impl SearchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entry(&mut self, entry: SearchResultEntry) {
        self.items.push(SearchItem::Entry(entry));
    }

    pub fn push_reference(&mut self, reference: SearchResultReference) {
        self.items.push(SearchItem::Reference(reference));
    }

    pub fn set_done(&mut self, done: LdapResponse) {
        self.done = done;
    }

    /// Entries and references in the order the server sent them
    pub fn items(&self) -> &[SearchItem] {
        &self.items
    }

    pub fn entries(&self) -> impl Iterator<Item = &SearchResultEntry> {
        self.items.iter().filter_map(|item| match item {
            SearchItem::Entry(entry) => Some(entry),
            SearchItem::Reference(_) => None,
        })
    }

    pub fn references(&self) -> impl Iterator<Item = &SearchResultReference> {
        self.items.iter().filter_map(|item| match item {
            SearchItem::Reference(reference) => Some(reference),
            SearchItem::Entry(_) => None,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// The terminal SearchResultDone
    pub fn done(&self) -> &LdapResponse {
        &self.done
    }

    pub fn result_code(&self) -> ResultCode {
        self.done.result_code()
    }
}
