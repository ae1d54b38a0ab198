//! Minimal FITS support: binary-table extensions behind an empty primary
//! HDU, which is all HEALPix map, alm and power-spectrum files use.

use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use ndarray::Array2;
use num::Complex;

use crate::{
    alm::{fits_index, from_fits_index, lmax_from_size, Alm},
    error::{Result, SimError},
    healpix::npix2nside,
    map::{SkyMap, STOKES_NAMES},
};

const BLOCK: usize = 2880;
const CARD: usize = 80;

#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ColumnData::Int(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::Float(v) => v.clone(),
        }
    }

    pub fn to_i64(&self) -> Vec<i64> {
        match self {
            ColumnData::Int(v) => v.clone(),
            ColumnData::Float(v) => v.iter().map(|&x| x.round() as i64).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinTable {
    pub keywords: Vec<(String, HeaderValue)>,
    pub columns: Vec<Column>,
}

impl BinTable {
    pub fn keyword(&self, key: &str) -> Option<&HeaderValue> {
        self.keywords
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn pad_card(mut s: String) -> String {
    s.truncate(CARD);
    format!("{:<80}", s)
}

fn format_card(key: &str, value: &HeaderValue) -> String {
    let v = match value {
        HeaderValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Int(i) => format!("{:>20}", i),
        HeaderValue::Float(f) => format!("{:>20}", format!("{:.12E}", f)),
        HeaderValue::Str(s) => format!("'{:<8}'", s.replace('\'', "''")),
    };
    pad_card(format!("{:<8}= {}", key, v))
}

fn header_block(cards: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK);
    for c in cards {
        out.extend_from_slice(c.as_bytes());
    }
    out.extend_from_slice(pad_card("END".to_string()).as_bytes());
    let rem = out.len() % BLOCK;
    if rem != 0 {
        out.resize(out.len() + BLOCK - rem, b' ');
    }
    out
}

fn encode_table(table: &BinTable) -> Result<Vec<u8>> {
    let nrows = table.columns.first().map(|c| c.data.len()).unwrap_or(0);
    if table.columns.iter().any(|c| c.data.len() != nrows) {
        return Err(SimError::numeric("binary table columns differ in length"));
    }
    let row_bytes: usize = table
        .columns
        .iter()
        .map(|c| match c.data {
            ColumnData::Int(_) => 4,
            ColumnData::Float(_) => 8,
        })
        .sum();

    let mut cards = vec![
        format_card("XTENSION", &HeaderValue::Str("BINTABLE".into())),
        format_card("BITPIX", &HeaderValue::Int(8)),
        format_card("NAXIS", &HeaderValue::Int(2)),
        format_card("NAXIS1", &HeaderValue::Int(row_bytes as i64)),
        format_card("NAXIS2", &HeaderValue::Int(nrows as i64)),
        format_card("PCOUNT", &HeaderValue::Int(0)),
        format_card("GCOUNT", &HeaderValue::Int(1)),
        format_card("TFIELDS", &HeaderValue::Int(table.columns.len() as i64)),
    ];
    for (i, c) in table.columns.iter().enumerate() {
        let tform = match c.data {
            ColumnData::Int(_) => "1J",
            ColumnData::Float(_) => "1D",
        };
        cards.push(format_card(
            &format!("TTYPE{}", i + 1),
            &HeaderValue::Str(c.name.clone()),
        ));
        cards.push(format_card(
            &format!("TFORM{}", i + 1),
            &HeaderValue::Str(tform.into()),
        ));
    }
    for (k, v) in &table.keywords {
        cards.push(format_card(k, v));
    }

    let mut out = header_block(&cards);
    let data_start = out.len();
    for row in 0..nrows {
        for c in &table.columns {
            match &c.data {
                ColumnData::Int(v) => {
                    let x = i32::try_from(v[row]).map_err(|_| {
                        SimError::numeric(format!("{} does not fit a 32-bit column", v[row]))
                    })?;
                    out.extend_from_slice(&x.to_be_bytes());
                }
                ColumnData::Float(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            }
        }
    }
    let rem = (out.len() - data_start) % BLOCK;
    if rem != 0 {
        out.resize(out.len() + BLOCK - rem, 0);
    }
    Ok(out)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Writes a complete file, replacing any existing one as a whole.
pub fn write_fits(path: impl AsRef<Path>, tables: &[BinTable]) -> Result<()> {
    let path = path.as_ref();
    let primary = header_block(&[
        format_card("SIMPLE", &HeaderValue::Logical(true)),
        format_card("BITPIX", &HeaderValue::Int(8)),
        format_card("NAXIS", &HeaderValue::Int(0)),
        format_card("EXTEND", &HeaderValue::Logical(true)),
    ]);
    let mut body = primary;
    for t in tables {
        body.extend(encode_table(t)?);
    }

    let tmp = temp_path(path);
    {
        let file = File::create(&tmp).map_err(|e| SimError::io(&tmp, e))?;
        let mut w = BufWriter::new(file);
        w.write_all(&body).map_err(|e| SimError::io(&tmp, e))?;
        w.flush().map_err(|e| SimError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| SimError::io(path, e))
}

fn parse_value(raw: &str) -> Option<HeaderValue> {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        let mut s = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    s.push('\'');
                } else {
                    break;
                }
            } else {
                s.push(ch);
            }
        }
        return Some(HeaderValue::Str(s.trim_end().to_string()));
    }
    let v = raw.split('/').next().unwrap_or("").trim();
    match v {
        "" => None,
        "T" => Some(HeaderValue::Logical(true)),
        "F" => Some(HeaderValue::Logical(false)),
        _ => v
            .parse::<i64>()
            .map(HeaderValue::Int)
            .or_else(|_| v.replace('D', "E").parse::<f64>().map(HeaderValue::Float))
            .ok(),
    }
}

struct RawHdu {
    keywords: Vec<(String, HeaderValue)>,
    data: Vec<u8>,
}

impl RawHdu {
    fn int(&self, key: &str) -> Option<i64> {
        self.keywords.iter().find(|(k, _)| k == key).and_then(|(_, v)| match v {
            HeaderValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    fn string(&self, key: &str) -> Option<&str> {
        self.keywords.iter().find(|(k, _)| k == key).and_then(|(_, v)| match v {
            HeaderValue::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

fn split_hdus(path: &Path, bytes: &[u8]) -> Result<Vec<RawHdu>> {
    let bad = |msg: &str| SimError::resource(path, msg.to_string());
    let mut hdus = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let mut keywords = Vec::new();
        let mut ended = false;
        while !ended {
            if pos + BLOCK > bytes.len() {
                return Err(bad("truncated FITS header"));
            }
            for card in bytes[pos..pos + BLOCK].chunks(CARD) {
                if !card.is_ascii() {
                    return Err(bad("non-ASCII header"));
                }
                let card = std::str::from_utf8(card).map_err(|_| bad("non-ASCII header"))?;
                let key = card[..8].trim();
                if key == "END" {
                    ended = true;
                    break;
                }
                if &card[8..10] == "= " {
                    if let Some(v) = parse_value(&card[10..]) {
                        keywords.push((key.to_string(), v));
                    }
                }
            }
            pos += BLOCK;
        }

        let mut hdu = RawHdu {
            keywords,
            data: Vec::new(),
        };
        let bitpix = hdu.int("BITPIX").ok_or_else(|| bad("missing BITPIX"))?;
        let naxis = hdu.int("NAXIS").ok_or_else(|| bad("missing NAXIS"))?;
        let count = |v: i64| usize::try_from(v).map_err(|_| bad("negative FITS dimension"));
        let mut size: usize = if naxis == 0 { 0 } else { 1 };
        for i in 1..=naxis {
            let n = hdu
                .int(&format!("NAXIS{}", i))
                .ok_or_else(|| bad("missing NAXISn"))?;
            size = size
                .checked_mul(count(n)?)
                .ok_or_else(|| bad("FITS data size overflows"))?;
        }
        let pcount = count(hdu.int("PCOUNT").unwrap_or(0))?;
        let gcount = count(hdu.int("GCOUNT").unwrap_or(1))?;
        let size = pcount
            .checked_add(size)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.unsigned_abs() as usize / 8))
            .ok_or_else(|| bad("FITS data size overflows"))?;
        if size > bytes.len() - pos {
            return Err(bad("truncated FITS data"));
        }
        hdu.data = bytes[pos..pos + size].to_vec();
        pos += size.div_ceil(BLOCK) * BLOCK;
        hdus.push(hdu);
    }
    Ok(hdus)
}

fn parse_tform(tform: &str) -> Option<(usize, char)> {
    let tform = tform.trim();
    let split = tform.find(|c: char| !c.is_ascii_digit())?;
    let repeat = if split == 0 {
        1
    } else {
        tform[..split].parse().ok()?
    };
    let code = tform[split..].chars().next()?;
    Some((repeat, code))
}

fn decode_table(path: &Path, hdu: &RawHdu) -> Result<BinTable> {
    let bad = |msg: String| SimError::resource(path, msg);
    if hdu.string("XTENSION") != Some("BINTABLE") {
        return Err(bad("extension is not a binary table".into()));
    }
    let count = |key: &str| {
        usize::try_from(hdu.int(key).unwrap_or(0)).map_err(|_| bad(format!("negative {}", key)))
    };
    let row_bytes = count("NAXIS1")?;
    let nrows = count("NAXIS2")?;
    let tfields = count("TFIELDS")?;
    if row_bytes.checked_mul(nrows).map_or(true, |n| n > hdu.data.len()) {
        return Err(bad("table is larger than its data unit".into()));
    }

    let mut layout = Vec::with_capacity(tfields);
    let mut offset = 0;
    for i in 1..=tfields {
        let tform = hdu
            .string(&format!("TFORM{}", i))
            .ok_or_else(|| bad(format!("missing TFORM{}", i)))?;
        let (repeat, code) =
            parse_tform(tform).ok_or_else(|| bad(format!("bad TFORM{} '{}'", i, tform)))?;
        let width = match code {
            'B' => 1,
            'I' => 2,
            'J' | 'E' => 4,
            'K' | 'D' => 8,
            _ => return Err(bad(format!("unsupported column type '{}'", code))),
        };
        let name = hdu
            .string(&format!("TTYPE{}", i))
            .map(str::to_string)
            .unwrap_or_else(|| format!("COL{}", i));
        layout.push((name, repeat, code, width, offset));
        offset = repeat
            .checked_mul(width)
            .and_then(|w| w.checked_add(offset))
            .ok_or_else(|| bad(format!("TFORM{} is too wide", i)))?;
    }
    if offset > row_bytes {
        return Err(bad("column layout exceeds row width".into()));
    }

    let columns = layout
        .into_iter()
        .map(|(name, repeat, code, width, offset)| {
            let cells = (0..nrows).flat_map(|row| {
                (0..repeat).map(move |k| row * row_bytes + offset + k * width)
            });
            let d = &hdu.data;
            let data = match code {
                'B' => ColumnData::Int(cells.map(|p| d[p] as i64).collect()),
                'I' => ColumnData::Int(
                    cells
                        .map(|p| i16::from_be_bytes([d[p], d[p + 1]]) as i64)
                        .collect(),
                ),
                'J' => ColumnData::Int(
                    cells
                        .map(|p| i32::from_be_bytes([d[p], d[p + 1], d[p + 2], d[p + 3]]) as i64)
                        .collect(),
                ),
                'K' => ColumnData::Int(cells.map(|p| i64::from_be_bytes(be8(d, p))).collect()),
                'E' => ColumnData::Float(
                    cells
                        .map(|p| f32::from_be_bytes([d[p], d[p + 1], d[p + 2], d[p + 3]]) as f64)
                        .collect(),
                ),
                _ => ColumnData::Float(cells.map(|p| f64::from_be_bytes(be8(d, p))).collect()),
            };
            Column { name, data }
        })
        .collect();

    Ok(BinTable {
        keywords: hdu.keywords.clone(),
        columns,
    })
}

fn be8(d: &[u8], p: usize) -> [u8; 8] {
    let mut b = [0_u8; 8];
    b.copy_from_slice(&d[p..p + 8]);
    b
}

/// Reads every binary-table extension; element 0 is HDU 1.
pub fn read_bintables(path: impl AsRef<Path>) -> Result<Vec<BinTable>> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| SimError::resource(path, e.to_string()))?;
    split_hdus(path, &bytes)?
        .iter()
        .skip(1)
        .map(|h| decode_table(path, h))
        .collect()
}

pub fn write_map(path: impl AsRef<Path>, map: &SkyMap) -> Result<()> {
    let names: &[&str] = if map.is_polarized() {
        &STOKES_NAMES
    } else {
        &["TEMPERATURE"]
    };
    let columns = names
        .iter()
        .enumerate()
        .map(|(c, name)| Column {
            name: name.to_string(),
            data: ColumnData::Float(map.component(c).to_vec()),
        })
        .collect();
    let keywords = vec![
        ("PIXTYPE".to_string(), HeaderValue::Str("HEALPIX".into())),
        ("ORDERING".to_string(), HeaderValue::Str("RING".into())),
        ("NSIDE".to_string(), HeaderValue::Int(map.nside() as i64)),
        ("FIRSTPIX".to_string(), HeaderValue::Int(0)),
        ("LASTPIX".to_string(), HeaderValue::Int(map.npix() as i64 - 1)),
        ("INDXSCHM".to_string(), HeaderValue::Str("IMPLICIT".into())),
        ("OBJECT".to_string(), HeaderValue::Str("FULLSKY".into())),
        ("POLCCONV".to_string(), HeaderValue::Str("COSMO".into())),
    ];
    write_fits(path, &[BinTable { keywords, columns }])
}

pub fn read_map(path: impl AsRef<Path>) -> Result<SkyMap> {
    let path = path.as_ref();
    let tables = read_bintables(path)?;
    let table = tables
        .first()
        .ok_or_else(|| SimError::resource(path, "no map extension"))?;
    let ncomp = if table.columns.len() >= 3 { 3 } else { 1 };
    let npix = table.columns.first().map(|c| c.data.len()).unwrap_or(0);
    let nside = match table.keyword("NSIDE") {
        Some(HeaderValue::Int(n)) => *n as usize,
        _ => npix2nside(npix).ok_or_else(|| SimError::resource(path, "pixel count is not HEALPix"))?,
    };
    let mut data = Array2::zeros((ncomp, npix));
    for c in 0..ncomp {
        data.row_mut(c)
            .iter_mut()
            .zip(table.columns[c].data.to_f64())
            .for_each(|(d, v)| *d = v);
    }
    SkyMap::from_array(nside, data)
}

/// One extension per component with `INDEX`, `REAL` and `IMAG` columns.
pub fn write_alm(path: impl AsRef<Path>, alm: &Alm) -> Result<()> {
    let tables: Vec<_> = (0..alm.ncomp())
        .map(|c| {
            let (index, (re, im)): (Vec<i64>, (Vec<f64>, Vec<f64>)) = alm
                .lm_iter()
                .map(|(l, m)| {
                    let v = alm.get(c, l, m);
                    (fits_index(l, m) as i64, (v.re, v.im))
                })
                .unzip();
            BinTable {
                keywords: vec![("MAX-LPOL".to_string(), HeaderValue::Int(alm.lmax() as i64))],
                columns: vec![
                    Column {
                        name: "INDEX".into(),
                        data: ColumnData::Int(index),
                    },
                    Column {
                        name: "REAL".into(),
                        data: ColumnData::Float(re),
                    },
                    Column {
                        name: "IMAG".into(),
                        data: ColumnData::Float(im),
                    },
                ],
            }
        })
        .collect();
    write_fits(path, &tables)
}

/// Reads the given 1-based extensions as the components of one coefficient
/// set. The band limit follows from the row count.
pub fn read_alm(path: impl AsRef<Path>, hdus: &[usize]) -> Result<Alm> {
    let path = path.as_ref();
    let tables = read_bintables(path)?;
    let mut lmax = None;
    let mut comps = Vec::with_capacity(hdus.len());
    for &h in hdus {
        let table = h
            .checked_sub(1)
            .and_then(|i| tables.get(i))
            .ok_or_else(|| SimError::resource(path, format!("no extension {}", h)))?;
        if table.columns.len() < 3 {
            return Err(SimError::resource(path, format!("extension {} is not an alm table", h)));
        }
        let index = table.columns[0].data.to_i64();
        let re = table.columns[1].data.to_f64();
        let im = table.columns[2].data.to_f64();
        let l = lmax_from_size(index.len()).ok_or_else(|| {
            SimError::numeric(format!(
                "{}: extension {} holds {} coefficients, not a full triangle",
                path.display(),
                h,
                index.len()
            ))
        })?;
        match lmax {
            None => lmax = Some(l),
            Some(prev) if prev != l => {
                return Err(SimError::numeric(format!(
                    "{}: extensions disagree on lmax ({} vs {})",
                    path.display(),
                    prev,
                    l
                )))
            }
            _ => {}
        }
        comps.push((index, re, im));
    }
    let lmax = lmax.ok_or_else(|| SimError::config("no alm extensions requested"))?;

    let mut alm = Alm::zeros(comps.len(), lmax);
    for (c, (index, re, im)) in comps.into_iter().enumerate() {
        for ((i, re), im) in index.into_iter().zip(re).zip(im) {
            let (l, m) = usize::try_from(i)
                .ok()
                .and_then(from_fits_index)
                .filter(|&(l, _)| l <= lmax)
                .ok_or_else(|| SimError::resource(path, format!("alm index {} out of range", i)))?;
            alm.set(c, l, m, Complex::new(re, im));
        }
    }
    Ok(alm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_are_fixed_width() {
        let c = format_card("NSIDE", &HeaderValue::Int(256));
        assert_eq!(c.len(), 80);
        assert_eq!(&c[..10], "NSIDE   = ");
        assert_eq!(c[10..30].trim(), "256");
        let s = format_card("ORDERING", &HeaderValue::Str("RING".into()));
        assert_eq!(s.trim_end(), "ORDERING= 'RING    '");
    }

    #[test]
    fn header_values_parse() {
        assert_eq!(parse_value("                   T"), Some(HeaderValue::Logical(true)));
        assert_eq!(parse_value("  42 / answer"), Some(HeaderValue::Int(42)));
        assert_eq!(parse_value(" 1.5D2"), Some(HeaderValue::Float(150.0)));
        assert_eq!(
            parse_value("'O''HARA  ' / name"),
            Some(HeaderValue::Str("O'HARA".into()))
        );
    }

    #[test]
    fn tform_parsing() {
        assert_eq!(parse_tform("1D"), Some((1, 'D')));
        assert_eq!(parse_tform("1024E"), Some((1024, 'E')));
        assert_eq!(parse_tform("J"), Some((1, 'J')));
        assert_eq!(parse_tform("12"), None);
    }

    #[test]
    fn map_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.fits");
        let mut map = SkyMap::zeros(2, 3);
        map.component_mut(1)
            .iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = i as f64 * 0.5);
        write_map(&path, &map).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() % BLOCK, 0);
        assert!(bytes.starts_with(b"SIMPLE  ="));

        let back = read_map(&path).unwrap();
        assert_eq!(back, map);
        let tables = read_bintables(&path).unwrap();
        assert_eq!(tables[0].keyword("ORDERING"), Some(&HeaderValue::Str("RING".into())));
        assert!(tables[0].column("q_stokes").is_some());
    }

    #[test]
    fn alm_file_keeps_band_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alm.fits");
        let mut alm = Alm::zeros(3, 5);
        for (l, m) in alm.lm_iter().collect::<Vec<_>>() {
            for c in 0..3 {
                let im = if m == 0 { 0.0 } else { -(l as f64) };
                alm.set(c, l, m, Complex::new((c * 100 + l * 10 + m) as f64, im));
            }
        }
        write_alm(&path, &alm).unwrap();
        let back = read_alm(&path, &[1, 2, 3]).unwrap();
        assert_eq!(back.lmax(), 5);
        assert_eq!(back, alm);
        assert!(matches!(read_alm(&path, &[4]), Err(SimError::Resource { .. })));
    }

    fn file_with_extension(cards: &[(&str, HeaderValue)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fits");
        let mut bytes = header_block(&[
            format_card("SIMPLE", &HeaderValue::Logical(true)),
            format_card("BITPIX", &HeaderValue::Int(8)),
            format_card("NAXIS", &HeaderValue::Int(0)),
        ]);
        let cards: Vec<String> = cards.iter().map(|(k, v)| format_card(k, v)).collect();
        bytes.extend(header_block(&cards));
        bytes.extend(vec![0_u8; BLOCK]);
        fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    fn table_header(naxis1: i64, naxis2: i64, pcount: i64) -> Vec<(&'static str, HeaderValue)> {
        vec![
            ("XTENSION", HeaderValue::Str("BINTABLE".into())),
            ("BITPIX", HeaderValue::Int(8)),
            ("NAXIS", HeaderValue::Int(2)),
            ("NAXIS1", HeaderValue::Int(naxis1)),
            ("NAXIS2", HeaderValue::Int(naxis2)),
            ("PCOUNT", HeaderValue::Int(pcount)),
            ("GCOUNT", HeaderValue::Int(1)),
            ("TFIELDS", HeaderValue::Int(0)),
        ]
    }

    #[test]
    fn corrupt_sizes_are_resource_errors() {
        for (naxis1, naxis2, pcount) in [(-8, 4, 0), (8, 4, -1), (i64::MAX, 4, 0), (8, 1 << 40, 0)] {
            let (_dir, path) = file_with_extension(&table_header(naxis1, naxis2, pcount));
            let err = read_bintables(&path).unwrap_err();
            assert!(matches!(err, SimError::Resource { .. }), "{:?}", err);
        }
        let (_dir, path) = file_with_extension(&table_header(8, 4, 0));
        assert_eq!(read_bintables(&path).unwrap().len(), 1);
    }

    #[test]
    fn non_ascii_header_is_a_resource_error() {
        let (_dir, path) = file_with_extension(&table_header(8, 4, 0));
        let mut bytes = fs::read(&path).unwrap();
        // a two-byte character straddling the keyword field of the second card
        bytes[CARD + 7] = 0xC3;
        bytes[CARD + 8] = 0xA9;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(read_bintables(&path), Err(SimError::Resource { .. })));
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = read_bintables("/nonexistent/fg.fits").unwrap_err();
        assert!(matches!(err, SimError::Resource { .. }));
    }
}
