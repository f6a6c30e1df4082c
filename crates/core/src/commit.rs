//! Commit and annotated tag objects
//!
//! Both share the same layout: a block of `key value` header lines (values
//! may continue on following lines that start with a single space), a blank
//! line, then the free-form message. Parsing keeps the raw bytes of every
//! field so that an unmodified object serializes back to the exact payload it
//! was read from.

use crate::error::ParseError;
use crate::hash::{ObjectId, ObjectKind};
use smallvec::SmallVec;

/// Headers that carry a signature over the commit payload
const SIGNATURE_HEADERS: [&[u8]; 2] = [b"gpgsig", b"gpgsig-sha256"];

/// Markers that start a signature block appended to a tag message
const TAG_SIGNATURE_MARKERS: [&[u8]; 3] = [
    b"-----BEGIN PGP SIGNATURE-----",
    b"-----BEGIN PGP MESSAGE-----",
    b"-----BEGIN SSH SIGNATURE-----",
];

/// An identity line: `Name <email> <unix-seconds> <tz>`
///
/// Stored verbatim; accessors parse on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    raw: Vec<u8>,
}

impl Signature {
    /// Build a signature from its parts
    pub fn new(name: &str, email: &str, seconds: i64, offset_minutes: i32) -> Self {
        let sign = if offset_minutes < 0 { '-' } else { '+' };
        let offset = offset_minutes.unsigned_abs();
        let raw = format!(
            "{} <{}> {} {}{:02}{:02}",
            name,
            email,
            seconds,
            sign,
            offset / 60,
            offset % 60
        );
        Self { raw: raw.into_bytes() }
    }

    /// Wrap a raw identity line
    pub fn from_raw(raw: &[u8]) -> Self {
        Self { raw: raw.to_vec() }
    }

    /// The raw identity line
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Name part (before ` <`)
    pub fn name(&self) -> &[u8] {
        match self.raw.iter().position(|&b| b == b'<') {
            Some(lt) => trim_end(&self.raw[..lt]),
            None => &self.raw,
        }
    }

    /// Email part (between `<` and `>`)
    pub fn email(&self) -> &[u8] {
        let lt = self.raw.iter().position(|&b| b == b'<');
        let gt = self.raw.iter().rposition(|&b| b == b'>');
        match (lt, gt) {
            (Some(lt), Some(gt)) if gt > lt => &self.raw[lt + 1..gt],
            _ => b"",
        }
    }

    /// Unix timestamp in seconds
    ///
    /// The timestamp is the second-to-last field, which tolerates spaces in
    /// names and emails.
    pub fn seconds(&self) -> Option<i64> {
        let gt = self.raw.iter().rposition(|&b| b == b'>')?;
        let tail = std::str::from_utf8(&self.raw[gt + 1..]).ok()?;
        tail.split_whitespace().next()?.parse().ok()
    }
}

/// A commit object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree
    pub tree: ObjectId,
    /// Parent commits in order (empty for roots)
    pub parents: SmallVec<[ObjectId; 2]>,
    pub author: Signature,
    pub committer: Signature,
    /// Remaining headers (`encoding`, `gpgsig`, `mergetag`, ...) in order
    pub extra_headers: Vec<(Vec<u8>, Vec<u8>)>,
    /// Raw message bytes
    pub message: Vec<u8>,
}

impl Commit {
    /// Parse a commit payload
    ///
    /// Headers must start with `tree`, then zero or more `parent`, then
    /// `author` and `committer`. Anything after `committer` is kept as an
    /// extra header.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let kind = ObjectKind::Commit;
        let (headers, message) = split_headers(kind, data)?;
        let mut headers = headers.into_iter().peekable();

        let tree = match headers.next() {
            Some((key, value)) if key == b"tree" => parse_hex_id(kind, &value)?,
            _ => return Err(ParseError::malformed(kind, "first header must be tree")),
        };

        let mut parents = SmallVec::new();
        while let Some((key, _)) = headers.peek() {
            if key.as_slice() != b"parent" {
                break;
            }
            if let Some((_, value)) = headers.next() {
                parents.push(parse_hex_id(kind, &value)?);
            }
        }

        let author = match headers.next() {
            Some((key, value)) if key == b"author" => Signature::from_raw(&value),
            _ => return Err(ParseError::malformed(kind, "missing author")),
        };
        let committer = match headers.next() {
            Some((key, value)) if key == b"committer" => Signature::from_raw(&value),
            _ => return Err(ParseError::malformed(kind, "missing committer")),
        };

        let extra_headers: Vec<_> = headers.collect();
        if extra_headers
            .iter()
            .any(|(k, _)| matches!(k.as_slice(), b"tree" | b"parent" | b"author" | b"committer"))
        {
            return Err(ParseError::malformed(kind, "core header out of order"));
        }

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            extra_headers,
            message: message.to_vec(),
        })
    }

    /// Serialize to the canonical payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        write_header(&mut out, b"tree", self.tree.to_hex().as_bytes());
        for parent in &self.parents {
            write_header(&mut out, b"parent", parent.to_hex().as_bytes());
        }
        write_header(&mut out, b"author", self.author.as_bytes());
        write_header(&mut out, b"committer", self.committer.as_bytes());
        for (key, value) in &self.extra_headers {
            write_header(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// Compute the id of this commit
    pub fn id(&self) -> ObjectId {
        ObjectId::for_object(ObjectKind::Commit, &self.serialize())
    }

    /// Committer timestamp, 0 when unparseable
    pub fn timestamp(&self) -> i64 {
        self.committer.seconds().unwrap_or(0)
    }

    /// Check for an embedded signature header
    pub fn is_signed(&self) -> bool {
        self.extra_headers.iter().any(|(k, _)| is_signature_header(k))
    }

    /// Remove signature headers, returning true if any were present
    pub fn strip_signatures(&mut self) -> bool {
        let before = self.extra_headers.len();
        self.extra_headers.retain(|(k, _)| !is_signature_header(k));
        before != self.extra_headers.len()
    }

    /// First line of the message, lossy
    pub fn summary(&self) -> String {
        let line = self.message.split(|&b| b == b'\n').next().unwrap_or_default();
        String::from_utf8_lossy(line).into_owned()
    }
}

/// An annotated tag object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tagged object
    pub target: ObjectId,
    /// Kind of the tagged object
    pub target_kind: ObjectKind,
    /// Tag name
    pub name: Vec<u8>,
    /// Tagger line, absent on some very old tags
    pub tagger: Option<Signature>,
    pub extra_headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub message: Vec<u8>,
}

impl Tag {
    /// Parse a tag payload
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let kind = ObjectKind::Tag;
        let (headers, message) = split_headers(kind, data)?;
        let mut headers = headers.into_iter().peekable();

        let target = match headers.next() {
            Some((key, value)) if key == b"object" => parse_hex_id(kind, &value)?,
            _ => return Err(ParseError::malformed(kind, "first header must be object")),
        };
        let target_kind = match headers.next() {
            Some((key, value)) if key == b"type" => ObjectKind::parse(&value)
                .ok_or_else(|| ParseError::malformed(kind, "unknown target type"))?,
            _ => return Err(ParseError::malformed(kind, "missing type")),
        };
        let name = match headers.next() {
            Some((key, value)) if key == b"tag" => value,
            _ => return Err(ParseError::malformed(kind, "missing tag name")),
        };
        let has_tagger = matches!(headers.peek(), Some((key, _)) if key.as_slice() == b"tagger");
        let tagger = if has_tagger {
            headers.next().map(|(_, value)| Signature::from_raw(&value))
        } else {
            None
        };

        Ok(Self {
            target,
            target_kind,
            name,
            tagger,
            extra_headers: headers.collect(),
            message: message.to_vec(),
        })
    }

    /// Serialize to the canonical payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(192 + self.message.len());
        write_header(&mut out, b"object", self.target.to_hex().as_bytes());
        write_header(&mut out, b"type", self.target_kind.as_str().as_bytes());
        write_header(&mut out, b"tag", &self.name);
        if let Some(tagger) = &self.tagger {
            write_header(&mut out, b"tagger", tagger.as_bytes());
        }
        for (key, value) in &self.extra_headers {
            write_header(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// Compute the id of this tag
    pub fn id(&self) -> ObjectId {
        ObjectId::for_object(ObjectKind::Tag, &self.serialize())
    }

    /// Drop a trailing signature block from the message
    pub fn strip_signature(&mut self) -> bool {
        let start = TAG_SIGNATURE_MARKERS
            .iter()
            .filter_map(|marker| find_line_start(&self.message, marker))
            .min();
        match start {
            Some(pos) => {
                self.message.truncate(pos);
                true
            }
            None => false,
        }
    }
}

type Headers = Vec<(Vec<u8>, Vec<u8>)>;

/// Split a payload into header pairs and message bytes
fn split_headers(kind: ObjectKind, data: &[u8]) -> Result<(Headers, &[u8]), ParseError> {
    let mut headers: Headers = Vec::new();
    let mut pos = 0;

    loop {
        if pos >= data.len() {
            // No blank line: header-only object with an empty message
            return Ok((headers, &[]));
        }
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(data.len());
        let line = &data[pos..end];
        pos = (end + 1).min(data.len());

        if line.is_empty() {
            return Ok((headers, &data[pos..]));
        }

        if line[0] == b' ' {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| ParseError::malformed(kind, "continuation before any header"))?;
            value.push(b'\n');
            value.extend_from_slice(&line[1..]);
            continue;
        }

        let (key, value) = match line.iter().position(|&b| b == b' ') {
            Some(sp) => (&line[..sp], &line[sp + 1..]),
            None => (line, &b""[..]),
        };
        headers.push((key.to_vec(), value.to_vec()));

        if end == data.len() {
            return Ok((headers, &[]));
        }
    }
}

fn is_signature_header(key: &[u8]) -> bool {
    SIGNATURE_HEADERS.iter().any(|h| *h == key)
}

fn write_header(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    for &b in value {
        out.push(b);
        if b == b'\n' {
            out.push(b' ');
        }
    }
    out.push(b'\n');
}

fn parse_hex_id(kind: ObjectKind, value: &[u8]) -> Result<ObjectId, ParseError> {
    let text = std::str::from_utf8(value)
        .map_err(|_| ParseError::malformed(kind, "non-ascii object id"))?;
    ObjectId::from_hex(text)
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    &bytes[..end]
}

fn find_line_start(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut start = 0;
    while start <= haystack.len() {
        if haystack[start..].starts_with(needle) {
            return Some(start);
        }
        start += haystack[start..].iter().position(|&b| b == b'\n')? + 1;
    }
    None
}
