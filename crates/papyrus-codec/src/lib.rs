//! papyrus-codec — little-endian binary primitives
//!
//! Fournit :
//! - `Cursor`, un lecteur borné sur un `&[u8]` (offset, `remaining`, `read_bytes`)
//! - lecteurs/écrivains LE pour i8/i16/i32/i64/f32/u16/u32/u64
//! - les trois formes de chaîne préfixée par longueur : z-string (jusqu'au
//!   null), l-string (u32 LE), w-string (u16 LE)
//! - `EidWidth`, le choix 32/64 bits d'un identifiant d'élément brut
//!
//! Ce crate ne sait rien du format Papyrus lui-même : il borne les lectures
//! et convertit les octets, rien de plus. La seule erreur qu'il produit est
//! `Truncated` ; les erreurs de format (tag invalide, variante inconnue...)
//! appartiennent aux couches qui interprètent ces octets.

#![deny(missing_docs)]

use std::fmt;

/// Résultat commun au codec.
pub type CodecResult<T> = Result<T, Truncated>;

/// Lecture primitive au-delà de la fin du buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("truncated at {where_}: needed {needed} byte(s), had {available}")]
pub struct Truncated {
    /// Description du point de lecture (ex: "string table count").
    pub where_: &'static str,
    /// Octets requis.
    pub needed: usize,
    /// Octets restants au moment de l'échec.
    pub available: usize,
}

/// Largeur d'un identifiant d'élément (EID) brut, dictée par la variante de jeu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EidWidth {
    /// 32 bits (Skyrim).
    Bits32,
    /// 64 bits (Fallout 4).
    Bits64,
}

impl EidWidth {
    /// Byte size of one raw EID at this width.
    pub fn byte_size(self) -> usize {
        match self {
            EidWidth::Bits32 => 4,
            EidWidth::Bits64 => 8,
        }
    }
}

/// Lecteur séquentiel borné sur un slice d'octets (helpers little-endian).
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    /// Construit un curseur sur l'intégralité du slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, off: 0 }
    }

    /// Position courante (octets consommés depuis le début).
    pub fn position(&self) -> usize {
        self.off
    }

    /// Octets restants avant la fin du buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.off)
    }

    /// Lit `n` octets bruts, ou `Truncated` si le buffer est trop court.
    pub fn read_bytes(&mut self, where_: &'static str, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(Truncated { where_, needed: n, available: self.remaining() });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un `u8`.
    pub fn read_u8(&mut self, where_: &'static str) -> CodecResult<u8> {
        Ok(self.read_bytes(where_, 1)?[0])
    }

    /// Lit un `i8`.
    pub fn read_i8(&mut self, where_: &'static str) -> CodecResult<i8> {
        Ok(self.read_u8(where_)? as i8)
    }

    /// Lit un `bool` à partir d'un octet non nul.
    pub fn read_bool(&mut self, where_: &'static str) -> CodecResult<bool> {
        Ok(self.read_u8(where_)? != 0)
    }

    /// Lit un `u16` little-endian.
    pub fn read_u16(&mut self, where_: &'static str) -> CodecResult<u16> {
        let b = self.read_bytes(where_, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Lit un `i16` little-endian.
    pub fn read_i16(&mut self, where_: &'static str) -> CodecResult<i16> {
        Ok(self.read_u16(where_)? as i16)
    }

    /// Lit un `u32` little-endian.
    pub fn read_u32(&mut self, where_: &'static str) -> CodecResult<u32> {
        let b = self.read_bytes(where_, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Lit un `i32` little-endian.
    pub fn read_i32(&mut self, where_: &'static str) -> CodecResult<i32> {
        Ok(self.read_u32(where_)? as i32)
    }

    /// Lit un `u64` little-endian.
    pub fn read_u64(&mut self, where_: &'static str) -> CodecResult<u64> {
        let b = self.read_bytes(where_, 8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Lit un `i64` little-endian.
    pub fn read_i64(&mut self, where_: &'static str) -> CodecResult<i64> {
        Ok(self.read_u64(where_)? as i64)
    }

    /// Lit un `f32` little-endian.
    pub fn read_f32(&mut self, where_: &'static str) -> CodecResult<f32> {
        let b = self.read_bytes(where_, 4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Lit un identifiant d'élément brut, zero-extended en `u64`, selon `width`.
    pub fn read_eid_raw(&mut self, where_: &'static str, width: EidWidth) -> CodecResult<u64> {
        match width {
            EidWidth::Bits32 => self.read_u32(where_).map(u64::from),
            EidWidth::Bits64 => self.read_u64(where_),
        }
    }

    /// z-string : octets jusqu'au prochain `0x00` (exclu), terminateur requis.
    pub fn read_zstring(&mut self, where_: &'static str) -> CodecResult<Vec<u8>> {
        let start = self.off;
        let mut end = start;
        while end < self.data.len() && self.data[end] != 0 {
            end += 1;
        }
        if end >= self.data.len() {
            return Err(Truncated { where_, needed: 1, available: 0 });
        }
        self.off = end + 1;
        Ok(self.data[start..end].to_vec())
    }

    /// l-string : `u32` LE de longueur puis les octets.
    pub fn read_lstring_bytes(&mut self, where_: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.read_u32(where_)? as usize;
        self.read_bytes(where_, len)
    }

    /// w-string : `u16` LE de longueur puis les octets.
    pub fn read_wstring_bytes(&mut self, where_: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.read_u16(where_)? as usize;
        self.read_bytes(where_, len)
    }
}

/// Buffer d'écriture little-endian (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Crée un writer vide.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Taille actuelle du buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Vrai si rien n'a été écrit.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Accès en lecture au contenu courant.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Récupère le buffer, consommant le writer.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Écrit un `u8`.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Écrit un `i8`.
    pub fn write_i8(&mut self, v: i8) {
        self.write_u8(v as u8);
    }

    /// Écrit un booléen comme un octet `0`/`1`.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Écrit un `u16` little-endian.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Écrit un `i16` little-endian.
    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16);
    }

    /// Écrit un `u32` little-endian.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Écrit un `i32` little-endian.
    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    /// Écrit un `u64` little-endian.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Écrit un `i64` little-endian.
    pub fn write_i64(&mut self, v: i64) {
        self.write_u64(v as u64);
    }

    /// Écrit un `f32` little-endian.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Écrit un identifiant d'élément brut selon `width` (tronqué si 32 bits).
    pub fn write_eid_raw(&mut self, v: u64, width: EidWidth) {
        match width {
            EidWidth::Bits32 => self.write_u32(v as u32),
            EidWidth::Bits64 => self.write_u64(v),
        }
    }

    /// Écrit une z-string : octets puis terminateur nul.
    pub fn write_zstring(&mut self, s: &[u8]) {
        self.write_bytes(s);
        self.write_u8(0);
    }

    /// Écrit une l-string : longueur `u32` LE puis octets.
    pub fn write_lstring(&mut self, s: &[u8]) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s);
    }

    /// Écrit une w-string : longueur `u16` LE puis octets.
    pub fn write_wstring(&mut self, s: &[u8]) {
        self.write_u16(s.len() as u16);
        self.write_bytes(s);
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.off)
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writer_reader_roundtrip() -> CodecResult<()> {
        let mut w = Writer::new();
        w.write_u16(0xBEEF);
        w.write_u32(0xDEAD_BEEF);
        w.write_i64(-42);
        w.write_f32(3.5);
        w.write_bool(true);
        w.write_wstring(b"hi");
        w.write_lstring(b"hello");
        w.write_zstring(b"zz");

        let mut r = Cursor::new(w.as_slice());
        assert_eq!(r.read_u16("u16")?, 0xBEEF);
        assert_eq!(r.read_u32("u32")?, 0xDEAD_BEEF);
        assert_eq!(r.read_i64("i64")?, -42);
        assert_eq!(r.read_f32("f32")?, 3.5);
        assert_eq!(r.read_bool("bool")?, true);
        assert_eq!(r.read_wstring_bytes("w")?, b"hi");
        assert_eq!(r.read_lstring_bytes("l")?, b"hello");
        assert_eq!(r.read_zstring("z")?, b"zz");
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn truncated_read_reports_needed_and_available() {
        let mut r = Cursor::new(&[0u8, 1]);
        let err = r.read_u32("thing").unwrap_err();
        assert_eq!(err.needed, 4);
        assert_eq!(err.available, 2);
        assert_eq!(err.where_, "thing");
    }

    #[test]
    fn zstring_without_terminator_is_truncated() {
        let mut r = Cursor::new(b"no-null");
        assert!(r.read_zstring("z").is_err());
    }

    #[test]
    fn eid_widths_roundtrip() -> CodecResult<()> {
        let mut w = Writer::new();
        w.write_eid_raw(0x1234_5678, EidWidth::Bits32);
        w.write_eid_raw(0x1122_3344_5566_7788, EidWidth::Bits64);
        let mut r = Cursor::new(w.as_slice());
        assert_eq!(r.read_eid_raw("a", EidWidth::Bits32)?, 0x1234_5678);
        assert_eq!(r.read_eid_raw("b", EidWidth::Bits64)?, 0x1122_3344_5566_7788);
        Ok(())
    }

    proptest::proptest! {
        #[test]
        fn u32_roundtrips_for_any_value(v: u32) {
            let mut w = Writer::new();
            w.write_u32(v);
            let mut r = Cursor::new(w.as_slice());
            proptest::prop_assert_eq!(r.read_u32("v").unwrap(), v);
        }
    }
}
