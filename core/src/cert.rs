//! Peer certificate snapshot and subject-name rendering.
//!
//! Only the path from `Certificate` down to `tbsCertificate.subject` is
//! walked; nothing here validates the certificate.

use std::fmt;

/// Leaf certificate presented by the peer during a handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    subject: String,
    der: Vec<u8>,
}

impl PeerCertificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        let subject = subject_name(&der).unwrap_or_else(|| {
            log::warn!("peer certificate subject could not be decoded");
            String::from("(undecodable subject)")
        });
        Self { subject, der }
    }

    /// Subject in one-line form, e.g. `C=US, O=Example Inc, CN=example.com`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCertificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}

const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_OID: u8 = 0x06;
const TAG_VERSION: u8 = 0xa0;

struct Der<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Der<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read one tag-length-value element and return its tag and contents.
    fn read(&mut self) -> Option<(u8, &'a [u8])> {
        let tag = *self.data.get(self.pos)?;
        self.pos += 1;
        let first = *self.data.get(self.pos)?;
        self.pos += 1;
        let len = if first < 0x80 {
            first as usize
        } else {
            // 0x80 is the BER indefinite form, which DER forbids.
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 {
                return None;
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | *self.data.get(self.pos)? as usize;
                self.pos += 1;
            }
            len
        };
        let end = self.pos.checked_add(len)?;
        let value = self.data.get(self.pos..end)?;
        self.pos = end;
        Some((tag, value))
    }

    fn take(&mut self, tag: u8) -> Option<&'a [u8]> {
        match self.read()? {
            (t, value) if t == tag => Some(value),
            _ => None,
        }
    }
}

/// Render the subject distinguished name of a DER certificate.
pub fn subject_name(der: &[u8]) -> Option<String> {
    let cert = Der::new(der).take(TAG_SEQUENCE)?;
    let mut tbs = Der::new(Der::new(cert).take(TAG_SEQUENCE)?);

    if tbs.peek_tag()? == TAG_VERSION {
        tbs.read()?;
    }
    tbs.read()?; // serialNumber
    tbs.take(TAG_SEQUENCE)?; // signature
    tbs.take(TAG_SEQUENCE)?; // issuer
    tbs.take(TAG_SEQUENCE)?; // validity
    let subject = tbs.take(TAG_SEQUENCE)?;

    render_name(subject)
}

fn render_name(name: &[u8]) -> Option<String> {
    let mut rdns = Der::new(name);
    let mut parts = Vec::new();
    while !rdns.is_empty() {
        let mut set = Der::new(rdns.take(TAG_SET)?);
        let mut attrs = Vec::new();
        while !set.is_empty() {
            let mut atv = Der::new(set.take(TAG_SEQUENCE)?);
            let oid = atv.take(TAG_OID)?;
            let (tag, value) = atv.read()?;
            attrs.push(format!("{}={}", attribute_label(oid), render_value(tag, value)));
        }
        parts.push(attrs.join(" + "));
    }
    Some(parts.join(", "))
}

fn attribute_label(oid: &[u8]) -> String {
    let short = match oid {
        [0x55, 0x04, 0x03] => "CN",
        [0x55, 0x04, 0x05] => "serialNumber",
        [0x55, 0x04, 0x06] => "C",
        [0x55, 0x04, 0x07] => "L",
        [0x55, 0x04, 0x08] => "ST",
        [0x55, 0x04, 0x09] => "street",
        [0x55, 0x04, 0x0a] => "O",
        [0x55, 0x04, 0x0b] => "OU",
        [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x01] => "emailAddress",
        _ => return dotted_oid(oid),
    };
    short.to_string()
}

fn dotted_oid(oid: &[u8]) -> String {
    let mut arcs: Vec<u64> = Vec::new();
    let mut acc = 0u64;
    for &b in oid {
        acc = (acc << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (acc / 40).min(2);
                arcs.push(first);
                arcs.push(acc - first * 40);
            } else {
                arcs.push(acc);
            }
            acc = 0;
        }
    }
    arcs.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
}

fn render_value(tag: u8, value: &[u8]) -> String {
    match tag {
        // UTF8String, PrintableString, TeletexString, IA5String
        0x0c | 0x13 | 0x14 | 0x16 => String::from_utf8_lossy(value).into_owned(),
        // BMPString
        0x1e => {
            let units: Vec<u16> = value
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => {
            let hex: String = value.iter().map(|b| format!("{b:02X}")).collect();
            format!("#{hex}")
        }
    }
}
