// Copyright 2022-2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt::{self, Write};

/// Maximum length in bytes of a rendered component name.
pub const MAX_COMPONENT_NAME_LEN: usize = 32;

/// A manifest component that can be addressed by a location string.
///
/// The manifest engine knows how a component is identified. Storages only need its name rendered
/// with their own separator, see [`StorageDriver::separator`](crate::StorageDriver::separator).
pub trait ComponentName {
    /// Writes the component name, using `separator` in front of each identifier part.
    ///
    /// Returns an error if the name can't be represented as text or doesn't fit `out`.
    fn write_name(&self, separator: char, out: &mut dyn Write) -> fmt::Result;
}

/// Component identifier given as a list of byte string parts.
///
/// The parts `["mtd", "0"]` render as `.mtd.0` with separator `.` and as `/mtd/0` with `/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentId<'a> {
    parts: &'a [&'a [u8]],
}

impl<'a> ComponentId<'a> {
    pub const fn new(parts: &'a [&'a [u8]]) -> Self {
        ComponentId { parts }
    }

    pub fn parts(&self) -> &'a [&'a [u8]] {
        self.parts
    }
}

impl ComponentName for ComponentId<'_> {
    fn write_name(&self, separator: char, out: &mut dyn Write) -> fmt::Result {
        for part in self.parts {
            let part = core::str::from_utf8(part).map_err(|_| fmt::Error)?;
            out.write_char(separator)?;
            out.write_str(part)?;
        }
        Ok(())
    }
}

/// Text buffer of fixed capacity living on the stack.
///
/// Writes that would exceed the capacity fail and leave the content unchanged.
pub struct TextBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> TextBuffer<N> {
    pub const fn new() -> Self {
        TextBuffer {
            buf: [0; N],
            len: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only whole `str` slices are ever copied in.
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> Default for TextBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for TextBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len.checked_add(s.len()).ok_or(fmt::Error)?;
        if end > N {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// Renders the name of `component` for a storage using `separator`.
///
/// Returns `None` if the component can't be named in that storage's syntax.
pub fn render_name<'b, const N: usize>(
    component: &(impl ComponentName + ?Sized),
    separator: char,
    buffer: &'b mut TextBuffer<N>,
) -> Option<&'b str> {
    buffer.clear();
    component.write_name(separator, buffer).ok()?;
    Some(buffer.as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_with_separator() {
        let component = ComponentId::new(&[b"mtd", b"0"]);
        let mut buffer = TextBuffer::<MAX_COMPONENT_NAME_LEN>::new();
        assert_eq!(render_name(&component, '.', &mut buffer), Some(".mtd.0"));
        assert_eq!(render_name(&component, '/', &mut buffer), Some("/mtd/0"));
    }

    #[test]
    fn test_render_empty_component() {
        let component = ComponentId::new(&[]);
        let mut buffer = TextBuffer::<MAX_COMPONENT_NAME_LEN>::new();
        assert_eq!(render_name(&component, '.', &mut buffer), Some(""));
    }

    #[test]
    fn test_render_rejects_binary_part() {
        let component = ComponentId::new(&[b"mtd", &[0xff, 0xfe]]);
        let mut buffer = TextBuffer::<MAX_COMPONENT_NAME_LEN>::new();
        assert_eq!(render_name(&component, '.', &mut buffer), None);
    }

    #[test]
    fn test_render_overflow() {
        // 1 + 30 + 1 + 1 = 33 bytes.
        let long = [b'a'; 30];
        let parts: [&[u8]; 2] = [&long, b"0"];
        let component = ComponentId::new(&parts);
        let mut buffer = TextBuffer::<MAX_COMPONENT_NAME_LEN>::new();
        assert_eq!(render_name(&component, '.', &mut buffer), None);
        let parts: [&[u8]; 2] = [&long[..29], b"0"];
        let component = ComponentId::new(&parts);
        assert_eq!(render_name(&component, '.', &mut buffer).map(str::len), Some(32));
    }

    #[test]
    fn test_text_buffer_keeps_content_on_overflow() {
        let mut buffer = TextBuffer::<4>::new();
        assert!(buffer.write_str("abc").is_ok());
        assert!(buffer.write_str("de").is_err());
        assert_eq!(buffer.as_str(), "abc");
        assert!(write!(buffer, "{}", 1).is_ok());
        assert_eq!(buffer.as_bytes(), b"abc1");
    }
}
