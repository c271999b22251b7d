//! DOS path translation
//!
//! DOS-ABI handlers turn `X:\dir\file` paths into POSIX paths before they
//! reach the VFS. Each drive letter maps to a POSIX root; `A:` and `C:` have
//! fixed defaults and every other letter falls back to `/<letter>`.

use alloc::borrow::Cow;
use alloc::format;
use alloc::string::{String, ToString};

use lk_api::{Error, Result};

/// Longest DOS path accepted, in characters
pub const MAX_DOS_PATH: usize = 260;

/// Characters DOS never allows in a path
const RESERVED_CHARS: [char; 6] = ['<', '>', '"', '|', '?', '*'];

const DRIVES: usize = 26;

fn drive_index(letter: char) -> Option<usize> {
    letter
        .is_ascii_alphabetic()
        .then(|| (letter.to_ascii_lowercase() as u8 - b'a') as usize)
}

fn drive_letter(index: usize) -> char {
    (b'a' + index as u8) as char
}

/// Drive letter to POSIX root mapping
///
/// Written during boot and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveMap {
    roots: [Option<String>; DRIVES],
}

impl DriveMap {
    /// Map with the stock entries: `A: -> /A`, `C: -> /HardDisk`
    pub fn new() -> Self {
        let mut map = Self::empty();
        map.roots[0] = Some("/A".to_string());
        map.roots[2] = Some("/HardDisk".to_string());
        map
    }

    /// Map where every letter uses the `/<letter>` fallback
    pub fn empty() -> Self {
        Self {
            roots: ::core::array::from_fn(|_| None),
        }
    }

    /// Maps `letter` to `root`.
    ///
    /// `root` must be absolute and free of backslashes; trailing slashes are
    /// dropped so `/mnt/d/` and `/mnt/d` mean the same thing.
    pub fn set(&mut self, letter: char, root: &str) -> Result<()> {
        let index = drive_index(letter)
            .ok_or_else(|| Error::InvalidArgument(format!("bad drive letter {:?}", letter)))?;
        if !root.starts_with('/') || root.contains('\\') {
            return Err(Error::InvalidPath(root.to_string()));
        }
        self.roots[index] = Some(root.trim_end_matches('/').to_string());
        Ok(())
    }

    /// Clears any explicit mapping for `letter`
    pub fn unset(&mut self, letter: char) {
        if let Some(index) = drive_index(letter) {
            self.roots[index] = None;
        }
    }

    /// POSIX root of `letter`, explicit or fallback
    pub fn root(&self, letter: char) -> Option<Cow<'_, str>> {
        let index = drive_index(letter)?;
        Some(match &self.roots[index] {
            Some(root) => Cow::Borrowed(root.as_str()),
            None => Cow::Owned(format!("/{}", drive_letter(index))),
        })
    }

    /// Explicit mappings as `(lowercase letter, root)`
    pub fn entries(&self) -> impl Iterator<Item = (char, &str)> + '_ {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(i, root)| root.as_deref().map(|r| (drive_letter(i), r)))
    }

    /// Translates a DOS path through this map
    pub fn dos_to_posix(&self, dos_path: &str) -> Result<String> {
        dos_to_posix(self, dos_path)
    }

    /// Reverse translation that also rebuilds the drive letter.
    ///
    /// The longest explicit root that prefixes `posix_path` wins, then the
    /// `/<letter>` fallbacks of unmapped drives. Paths under no root only
    /// get their separators swapped.
    pub fn posix_to_dos_drive(&self, posix_path: &str) -> String {
        let under = |root: &str| -> Option<usize> {
            let rest = posix_path.strip_prefix(root)?;
            (rest.is_empty() || rest.starts_with('/')).then_some(root.len())
        };

        let explicit = self
            .entries()
            .filter(|(_, root)| !root.is_empty())
            .filter_map(|(letter, root)| under(root).map(|len| (letter, len)))
            .max_by_key(|&(_, len)| len);
        let fallback = || {
            (0..DRIVES)
                .filter(|&i| self.roots[i].is_none())
                .find_map(|i| {
                    let root = format!("/{}", drive_letter(i));
                    under(&root).map(|len| (drive_letter(i), len))
                })
        };

        match explicit.or_else(fallback) {
            Some((letter, len)) => {
                let rest = posix_path[len..].trim_start_matches('/');
                format!("{}:\\{}", letter.to_ascii_uppercase(), posix_to_dos(rest))
            }
            None => posix_to_dos(posix_path),
        }
    }
}

impl Default for DriveMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `X:\rest` into the drive letter and `rest`
pub fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let rest = path[1..].strip_prefix(":\\")?;
    Some((letter, rest))
}

/// Converts a DOS path to a POSIX path.
///
/// `X:\rest` becomes `<root of x>/rest`; anything else is kept as-is. In
/// both cases every `\` turns into `/`. Paths longer than
/// [`MAX_DOS_PATH`] characters are rejected.
pub fn dos_to_posix(map: &DriveMap, dos_path: &str) -> Result<String> {
    let len = dos_path.chars().count();
    if len > MAX_DOS_PATH {
        return Err(Error::PathTooLong {
            len,
            max: MAX_DOS_PATH,
        });
    }

    let mut out = String::with_capacity(dos_path.len() + 16);
    let rest = match split_drive(dos_path).and_then(|(l, rest)| Some((map.root(l)?, rest))) {
        Some((root, rest)) => {
            out.push_str(&root);
            out.push('/');
            rest
        }
        None => dos_path,
    };
    out.extend(rest.chars().map(|c| if c == '\\' { '/' } else { c }));
    Ok(out)
}

/// Converts a POSIX path to DOS separators. No drive letter is rebuilt;
/// see [`DriveMap::posix_to_dos_drive`] for that.
pub fn posix_to_dos(posix_path: &str) -> String {
    posix_path.replace('/', "\\")
}

/// Whether `path` is short enough and free of reserved characters
pub fn is_valid_dos_path(path: &str) -> bool {
    !path.is_empty()
        && path.chars().count() <= MAX_DOS_PATH
        && !path.chars().any(|c| RESERVED_CHARS.contains(&c) || c.is_control())
}
