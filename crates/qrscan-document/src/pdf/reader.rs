// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open PDF documents with `lopdf` and pull every raster image
// painted on a page out of it as a `RawImage`. Images follow the page's
// content stream: one entry per `Do` of an image XObject, in paint order,
// including images painted inside form XObjects.
//
// Supported image encodings: unfiltered and FlateDecode samples at 1, 2, 4, 8
// or 16 bits per component in DeviceGray, DeviceRGB, DeviceCMYK, CalGray,
// CalRGB, ICCBased (by component count) and Indexed colour spaces, image
// masks, and DCTDecode (JPEG). Anything else is reported per image as
// `UnsupportedImage` so the caller can still account for it.

use std::collections::BTreeMap;

use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::{PageImageExtractor, PageSource};
use qrscan_core::types::RawImage;
use tracing::{debug, instrument, warn};

use crate::raster::convert::from_dynamic;

/// Maximum depth followed through `/Parent` links or nested form XObjects.
const MAX_NESTING: usize = 16;

/// Filters whose output we cannot turn into samples.
const UNSUPPORTED_FILTERS: &[&[u8]] = &[b"JPXDecode", b"JBIG2Decode", b"CCITTFaxDecode"];

/// An opened PDF document with its page tree resolved.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
    /// 1-indexed page number → page object.
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            QrScanError::DocumentOpen(format!("failed to load PDF from memory: {err}"))
        })?;
        let pages = document.get_pages();

        debug!(pages = pages.len(), "PDF loaded from bytes");
        Ok(Self { document, pages })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    // -- Extraction -----------------------------------------------------------

    /// Every image painted on `page_number` (1-indexed), in paint order. An
    /// image painted twice appears twice; resources that are never painted
    /// do not appear at all.
    #[instrument(skip(self))]
    pub fn page_images(&self, page_number: u32) -> Result<Vec<Result<RawImage>>> {
        let page_id = *self
            .pages
            .get(&page_number)
            .ok_or_else(|| QrScanError::PageExtraction {
                page: page_number,
                reason: format!("page out of range (document has {} pages)", self.pages.len()),
            })?;

        let mut images = Vec::new();
        if self.document.get_page_contents(page_id).is_empty() {
            debug!(page_number, "page has no content stream");
            return Ok(images);
        }

        let content = self
            .document
            .get_and_decode_page_content(page_id)
            .map_err(|err| QrScanError::PageExtraction {
                page: page_number,
                reason: format!("content stream: {err}"),
            })?;
        let resources = self.page_resources(page_number, page_id)?;
        self.paint(&content.operations, resources, &mut Vec::new(), &mut images);

        debug!(page_number, images = images.len(), "page images collected");
        Ok(images)
    }

    // -- Helpers --------------------------------------------------------------

    /// Resources dictionary for a page, following inheritance through
    /// `/Parent` page-tree nodes.
    fn page_resources(&self, page_number: u32, page_id: ObjectId) -> Result<Option<&Dictionary>> {
        let page_err = |reason: String| QrScanError::PageExtraction {
            page: page_number,
            reason,
        };

        let mut node_id = page_id;
        for _ in 0..MAX_NESTING {
            let node = self
                .document
                .get_object(node_id)
                .and_then(|obj| obj.as_dict())
                .map_err(|err| page_err(format!("page node {node_id:?}: {err}")))?;

            if let Ok(resources) = node.get(b"Resources") {
                let dict = resolve(&self.document, resources)
                    .and_then(|obj| obj.as_dict())
                    .map_err(|err| page_err(format!("resources: {err}")))?;
                return Ok(Some(dict));
            }

            match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => node_id = *parent,
                _ => return Ok(None),
            }
        }

        warn!(page_number, "page tree deeper than {MAX_NESTING} levels, no resources found");
        Ok(None)
    }

    /// Follow the `Do` operators of a content stream. `forms` holds the form
    /// XObjects currently being walked, outermost first.
    fn paint(
        &self,
        operations: &[Operation],
        resources: Option<&Dictionary>,
        forms: &mut Vec<Option<ObjectId>>,
        out: &mut Vec<Result<RawImage>>,
    ) {
        for operation in operations.iter().filter(|op| op.operator == "Do") {
            let Some(Object::Name(name)) = operation.operands.first() else {
                warn!("Do operator without a name operand");
                continue;
            };
            let Some(entry) = resources.and_then(|r| xobject_entry(&self.document, r, name)) else {
                warn!(name = %String::from_utf8_lossy(name), "painted XObject missing from resources");
                continue;
            };
            let Ok(Object::Stream(stream)) = resolve(&self.document, entry) else {
                warn!(name = %String::from_utf8_lossy(name), "XObject entry is not a stream");
                continue;
            };

            match name_of(&self.document, &stream.dict, b"Subtype") {
                Some(b"Image") => out.push(self.decode_image(stream)),
                Some(b"Form") => {
                    let form_id = match entry {
                        Object::Reference(id) => Some(*id),
                        _ => None,
                    };
                    self.paint_form(form_id, stream, resources, forms, out);
                }
                _ => {}
            }
        }
    }

    /// Walk a form XObject's own content. Forms without `/Resources` use
    /// the resources of whatever painted them.
    fn paint_form(
        &self,
        form_id: Option<ObjectId>,
        stream: &Stream,
        inherited: Option<&Dictionary>,
        forms: &mut Vec<Option<ObjectId>>,
        out: &mut Vec<Result<RawImage>>,
    ) {
        if forms.len() >= MAX_NESTING {
            warn!("form XObjects nested deeper than {MAX_NESTING} levels, skipped");
            return;
        }
        if form_id.is_some() && forms.contains(&form_id) {
            warn!(form = ?form_id, "form XObject paints itself, skipped");
            return;
        }

        let data = if filter_names(&self.document, &stream.dict).is_empty() {
            Ok(stream.content.clone())
        } else {
            stream.decompressed_content()
        };
        let content = match data.and_then(|bytes| Content::decode(&bytes)) {
            Ok(content) => content,
            Err(err) => {
                warn!(form = ?form_id, error = %err, "form XObject content unreadable, skipped");
                return;
            }
        };
        let resources = stream
            .dict
            .get(b"Resources")
            .and_then(|obj| resolve(&self.document, obj))
            .and_then(|obj| obj.as_dict())
            .ok()
            .or(inherited);

        forms.push(form_id);
        self.paint(&content.operations, resources, forms, out);
        forms.pop();
    }

    /// Turn one image XObject into 8-bit interleaved samples.
    fn decode_image(&self, stream: &Stream) -> Result<RawImage> {
        let dict = &stream.dict;
        let width = positive_int(&self.document, dict, b"Width")?;
        let height = positive_int(&self.document, dict, b"Height")?;
        let filters = filter_names(&self.document, dict);

        if let Some(filter) = filters
            .iter()
            .find(|f| UNSUPPORTED_FILTERS.contains(&f.as_slice()))
        {
            return Err(QrScanError::UnsupportedImage(format!(
                "{} filter",
                String::from_utf8_lossy(filter)
            )));
        }

        if filters.last().map(Vec::as_slice) == Some(&b"DCTDecode"[..]) {
            let jpeg = if filters.len() == 1 {
                stream.content.clone()
            } else {
                stream.decompressed_content().map_err(|err| {
                    QrScanError::ImageProcessing(format!("cannot unwrap JPEG stream: {err}"))
                })?
            };
            let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
                .map_err(|err| QrScanError::ImageProcessing(format!("JPEG decode failed: {err}")))?;
            return Ok(from_dynamic(decoded));
        }

        let data = if filters.is_empty() {
            stream.content.clone()
        } else {
            stream.decompressed_content().map_err(|err| {
                QrScanError::ImageProcessing(format!("stream decompression failed: {err}"))
            })?
        };

        let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
        let (space, bpc) = if is_mask {
            (ColorSpace::Gray, 1)
        } else {
            let space = dict
                .get(b"ColorSpace")
                .map_err(|_| QrScanError::UnsupportedImage("image without /ColorSpace".into()))
                .and_then(|obj| ColorSpace::parse(&self.document, obj))?;
            let bpc = dict
                .get(b"BitsPerComponent")
                .ok()
                .and_then(|obj| resolve(&self.document, obj).ok())
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(8);
            (space, bpc)
        };

        if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
            return Err(QrScanError::UnsupportedImage(format!(
                "{bpc} bits per component"
            )));
        }

        let indexed = matches!(space, ColorSpace::Indexed { .. });
        let components = space.components();
        let mut samples = unpack_samples(&data, width, height, components, bpc as u32, !indexed)?;

        if inverted_decode(&self.document, dict) && !indexed {
            samples.iter_mut().for_each(|s| *s = 255 - *s);
        }

        Ok(space.into_raw(samples, width, height))
    }
}

impl PageSource for PdfReader {
    fn page_count(&self) -> u32 {
        PdfReader::page_count(self)
    }

    fn page_images(&self, page: u32) -> Result<Vec<Result<RawImage>>> {
        PdfReader::page_images(self, page)
    }
}

/// `PageImageExtractor` that opens documents with [`PdfReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl PageImageExtractor for LopdfExtractor {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(PdfReader::from_bytes(bytes)?))
    }
}

// ---------------------------------------------------------------------------
// Colour spaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, lookup: Vec<u8> },
}

impl ColorSpace {
    fn parse(doc: &Document, object: &Object) -> Result<Self> {
        let object = resolve(doc, object).map_err(unsupported)?;
        match object {
            Object::Name(name) => Self::from_family(name),
            Object::Array(items) => {
                let family = match items.first().and_then(|f| resolve(doc, f).ok()) {
                    Some(Object::Name(name)) => name.as_slice(),
                    _ => return Err(unsupported("colour space array without family")),
                };
                match family {
                    b"ICCBased" => {
                        let n = items
                            .get(1)
                            .and_then(|obj| resolve(doc, obj).ok())
                            .and_then(|obj| obj.as_stream().ok())
                            .and_then(|s| s.dict.get(b"N").ok())
                            .and_then(|n| n.as_i64().ok())
                            .unwrap_or(3);
                        match n {
                            1 => Ok(Self::Gray),
                            3 => Ok(Self::Rgb),
                            4 => Ok(Self::Cmyk),
                            other => Err(unsupported(format!("ICCBased with {other} components"))),
                        }
                    }
                    b"Indexed" | b"I" => {
                        let base = items
                            .get(1)
                            .ok_or_else(|| unsupported("Indexed without base"))
                            .and_then(|b| Self::parse(doc, b))?;
                        if matches!(base, Self::Indexed { .. }) {
                            return Err(unsupported("nested Indexed colour space"));
                        }
                        let lookup = match items.get(3).map(|l| resolve(doc, l)) {
                            Some(Ok(Object::String(bytes, _))) => bytes.clone(),
                            Some(Ok(Object::Stream(stream))) => stream
                                .decompressed_content()
                                .unwrap_or_else(|_| stream.content.clone()),
                            _ => return Err(unsupported("Indexed without lookup table")),
                        };
                        Ok(Self::Indexed {
                            base: Box::new(base),
                            lookup,
                        })
                    }
                    other => Self::from_family(other),
                }
            }
            _ => Err(unsupported("colour space is neither name nor array")),
        }
    }

    fn from_family(name: &[u8]) -> Result<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(Self::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(Self::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(Self::Cmyk),
            other => Err(unsupported(format!(
                "{} colour space",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Components per sample in the image data.
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    fn into_raw(self, samples: Vec<u8>, width: u32, height: u32) -> RawImage {
        match self {
            Self::Gray => RawImage::new(samples, width, height, 1),
            Self::Rgb => RawImage::new(samples, width, height, 3),
            Self::Cmyk => RawImage::new(cmyk_to_rgb(&samples), width, height, 3),
            Self::Indexed { base, lookup } => {
                let stride = base.components();
                let mut expanded = Vec::with_capacity(samples.len() * stride);
                for index in samples {
                    let start = index as usize * stride;
                    match lookup.get(start..start + stride) {
                        Some(entry) => expanded.extend_from_slice(entry),
                        None => expanded.extend(std::iter::repeat_n(0, stride)),
                    }
                }
                base.into_raw(expanded, width, height)
            }
        }
    }
}

fn unsupported(reason: impl std::fmt::Display) -> QrScanError {
    QrScanError::UnsupportedImage(reason.to_string())
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u32;
            [
                ((255 - px[0] as u32) * k / 255) as u8,
                ((255 - px[1] as u32) * k / 255) as u8,
                ((255 - px[2] as u32) * k / 255) as u8,
            ]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sample unpacking
// ---------------------------------------------------------------------------

/// Unpack packed rows into one byte per component. Rows are padded to a byte
/// boundary. With `scale` set, sub-byte and 16-bit samples are rescaled to
/// 0..=255; without it (palette indices) they are kept as-is.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bpc: u32,
    scale: bool,
) -> Result<Vec<u8>> {
    let overflow = || QrScanError::ImageProcessing(format!("{width}x{height} image is too large"));
    let per_row = (width as usize).checked_mul(components).ok_or_else(overflow)?;
    let row_bytes = per_row
        .checked_mul(bpc as usize)
        .ok_or_else(overflow)?
        .div_ceil(8);
    let needed = row_bytes.checked_mul(height as usize).ok_or_else(overflow)?;
    let samples = per_row.checked_mul(height as usize).ok_or_else(overflow)?;
    if data.len() < needed {
        return Err(QrScanError::ImageProcessing(format!(
            "image data holds {} bytes, expected {needed}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(samples);
    for row in data[..needed].chunks_exact(row_bytes) {
        match bpc {
            8 => out.extend_from_slice(&row[..per_row]),
            16 => out.extend(row.chunks_exact(2).take(per_row).map(|pair| pair[0])),
            _ => {
                let max = (1u32 << bpc) - 1;
                let per_byte = 8 / bpc as usize;
                for i in 0..per_row {
                    let byte = row[i / per_byte];
                    let shift = 8 - bpc as usize * (i % per_byte + 1);
                    let value = (byte as u32 >> shift) & max;
                    out.push(if scale { (value * 255 / max) as u8 } else { value as u8 });
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Dictionary helpers
// ---------------------------------------------------------------------------

/// The `/XObject` resource called `name`, if any.
fn xobject_entry<'a>(doc: &'a Document, resources: &'a Dictionary, name: &[u8]) -> Option<&'a Object> {
    resources
        .get(b"XObject")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict())
        .and_then(|xobjects| xobjects.get(name))
        .ok()
}

/// Follow indirect references until a direct object is reached.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> lopdf::Result<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_NESTING {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            direct => return Ok(direct),
        }
    }
    Ok(current)
}

fn name_of<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key).ok().and_then(|obj| resolve(doc, obj).ok()) {
        Some(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

fn positive_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<u32> {
    let value = dict
        .get(key)
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_i64())
        .map_err(|err| {
            QrScanError::ImageProcessing(format!("/{}: {err}", String::from_utf8_lossy(key)))
        })?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            QrScanError::ImageProcessing(format!(
                "/{} must be positive, got {value}",
                String::from_utf8_lossy(key)
            ))
        })
}

/// `/Filter` as a list of names (a single name or an array of names).
fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter").and_then(|obj| resolve(doc, obj)) {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match resolve(doc, item) {
                Ok(Object::Name(name)) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `/Decode [1 0 ...]` flips sample polarity.
fn inverted_decode(doc: &Document, dict: &Dictionary) -> bool {
    let Ok(Object::Array(values)) = dict.get(b"Decode").and_then(|obj| resolve(doc, obj)) else {
        return false;
    };
    let as_f = |obj: Option<&Object>| match obj {
        Some(Object::Integer(i)) => Some(*i as f32),
        Some(Object::Real(r)) => Some(*r),
        _ => None,
    };
    matches!((as_f(values.first()), as_f(values.get(1))), (Some(lo), Some(hi)) if lo > hi)
}
