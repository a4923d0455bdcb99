//! Frame annotation.
//!
//! Draws boxes and labels onto a copy of the frame. Frames without a
//! detection result pass through untouched and keep sharing their buffer.

use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use vdet_models::{AnnotationOptions, Detection, DetectionResult};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Box outline width in pixels.
pub const LINE_WIDTH: u32 = 2;

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
/// Approximate glyph advance when no font is configured
const FALLBACK_GLYPH_WIDTH: i32 = 8;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// Stable per-class colour.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Label drawn next to a box, or `None` when both parts are disabled.
///
/// `"person 0.87"`, `"person"`, `"0.87"`.
pub fn label_text(detection: &Detection, options: AnnotationOptions) -> Option<String> {
    match (options.show_labels, options.show_confidence) {
        (true, true) => Some(format!("{} {:.2}", detection.class_name, detection.confidence)),
        (true, false) => Some(detection.class_name.clone()),
        (false, true) => Some(format!("{:.2}", detection.confidence)),
        (false, false) => None,
    }
}

/// Draws detection results onto frames.
pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Annotator without a font: boxes and label bars, no text.
    pub fn new() -> Self {
        Self {
            font: None,
            scale: Scale::uniform(LABEL_FONT_SIZE),
        }
    }

    pub fn with_font(font: Font<'static>) -> Self {
        Self {
            font: Some(font),
            ..Self::new()
        }
    }

    /// Load a TrueType font for label text.
    pub fn from_font_file(path: &Path) -> MediaResult<Self> {
        let data = std::fs::read(path)?;
        let font = Font::try_from_vec(data).ok_or_else(|| {
            MediaError::annotation_failed(format!("Invalid font file: {}", path.display()))
        })?;
        Ok(Self::with_font(font))
    }

    /// Annotate a frame with a (possibly stale) detection result.
    ///
    /// `None` returns the frame unchanged, sharing its buffer.
    pub fn annotate(
        &self,
        frame: &Frame,
        result: Option<&DetectionResult>,
        options: AnnotationOptions,
    ) -> MediaResult<Frame> {
        let Some(result) = result else {
            return Ok(frame.clone());
        };

        if result.width != frame.width() || result.height != frame.height() {
            return Err(MediaError::annotation_failed(format!(
                "Detection result is {}x{}, frame {} is {}x{}",
                result.width,
                result.height,
                frame.index(),
                frame.width(),
                frame.height()
            )));
        }

        if result.is_empty() {
            return Ok(frame.clone());
        }

        let mut image = frame.image().clone();
        self.draw(&mut image, &result.detections, options);
        Ok(frame.with_image(image))
    }

    /// Draw detections onto an image in place.
    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection], options: AnnotationOptions) {
        for detection in detections {
            self.draw_one(image, detection, options);
        }
    }

    fn draw_one(&self, image: &mut RgbImage, detection: &Detection, options: AnnotationOptions) {
        let color = class_color(detection.class_id);
        let bbox = detection.bbox;
        let x = bbox.x1 as i32;
        let y = bbox.y1 as i32;
        let w = (bbox.width() as u32).max(1);
        let h = (bbox.height() as u32).max(1);

        // Thickness grows inward so the outline stays inside the box
        for offset in 0..LINE_WIDTH {
            if w <= offset * 2 || h <= offset * 2 {
                break;
            }
            let rect = Rect::at(x + offset as i32, y + offset as i32)
                .of_size(w - offset * 2, h - offset * 2);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(label) = label_text(detection, options) else {
            return;
        };

        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(self.scale, font, &label),
            None => (
                label.chars().count() as i32 * FALLBACK_GLYPH_WIDTH,
                self.scale.y as i32,
            ),
        };
        let bar_w = (text_w + LABEL_PADDING * 2).max(1) as u32;
        let bar_h = (text_h + LABEL_PADDING * 2).max(1) as u32;

        // Above the box, or inside it when there is no room
        let bar_y = if y >= bar_h as i32 { y - bar_h as i32 } else { y };
        draw_filled_rect_mut(image, Rect::at(x, bar_y).of_size(bar_w, bar_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                TEXT_COLOR,
                x + LABEL_PADDING,
                bar_y + LABEL_PADDING,
                self.scale,
                font,
                &label,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdet_models::BoundingBox;

    fn detection(class_id: usize, bbox: BoundingBox) -> Detection {
        Detection {
            class_id,
            class_name: "person".into(),
            confidence: 0.8712,
            bbox,
        }
    }

    fn options(show_labels: bool, show_confidence: bool) -> AnnotationOptions {
        AnnotationOptions {
            show_labels,
            show_confidence,
        }
    }

    #[test]
    fn test_label_text_variants() {
        let d = detection(0, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(label_text(&d, options(true, true)).as_deref(), Some("person 0.87"));
        assert_eq!(label_text(&d, options(true, false)).as_deref(), Some("person"));
        assert_eq!(label_text(&d, options(false, true)).as_deref(), Some("0.87"));
        assert_eq!(label_text(&d, options(false, false)), None);
    }

    #[test]
    fn test_class_color_is_stable() {
        assert_eq!(class_color(3), class_color(3));
        assert_eq!(class_color(0), class_color(PALETTE.len()));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn test_annotate_none_shares_buffer() {
        let frame = Frame::new(0, 10.0, RgbImage::new(64, 48));
        let out = Annotator::new()
            .annotate(&frame, None, AnnotationOptions::default())
            .unwrap();
        assert!(out.shares_buffer(&frame));
    }

    #[test]
    fn test_annotate_draws_on_a_copy() {
        let frame = Frame::new(4, 10.0, RgbImage::new(64, 48));
        let result = DetectionResult {
            frame_index: 0,
            width: 64,
            height: 48,
            detections: vec![detection(0, BoundingBox::new(20.0, 20.0, 40.0, 40.0))],
        };

        let out = Annotator::new()
            .annotate(&frame, Some(&result), AnnotationOptions::default())
            .unwrap();

        assert!(!out.shares_buffer(&frame));
        assert_eq!(out.index(), 4);
        assert_eq!(*out.image().get_pixel(20, 30), class_color(0));
        assert_eq!(*out.image().get_pixel(21, 30), class_color(0));
        assert_eq!(*out.image().get_pixel(30, 30), Rgb([0, 0, 0]));
        // Source untouched
        assert_eq!(*frame.image().get_pixel(20, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_without_labels_draws_no_bar() {
        let frame = Frame::new(0, 10.0, RgbImage::new(64, 48));
        let result = DetectionResult {
            frame_index: 0,
            width: 64,
            height: 48,
            detections: vec![detection(0, BoundingBox::new(20.0, 30.0, 40.0, 40.0))],
        };

        let out = Annotator::new()
            .annotate(&frame, Some(&result), options(false, false))
            .unwrap();
        assert_eq!(*out.image().get_pixel(22, 25), Rgb([0, 0, 0]));

        let labelled = Annotator::new()
            .annotate(&frame, Some(&result), options(true, true))
            .unwrap();
        assert_eq!(*labelled.image().get_pixel(22, 25), class_color(0));
    }

    #[test]
    fn test_annotate_rejects_mismatched_geometry() {
        let frame = Frame::new(0, 10.0, RgbImage::new(64, 48));
        let result = DetectionResult::empty(0, 32, 24);
        let err = Annotator::new()
            .annotate(&frame, Some(&result), AnnotationOptions::default())
            .unwrap_err();
        assert!(matches!(err, MediaError::AnnotationFailed(_)));
    }

    #[test]
    fn test_annotate_box_at_frame_edge() {
        let frame = Frame::new(0, 10.0, RgbImage::new(16, 16));
        let result = DetectionResult {
            frame_index: 0,
            width: 16,
            height: 16,
            detections: vec![detection(2, BoundingBox::new(0.0, 0.0, 16.0, 16.0))],
        };
        let out = Annotator::new()
            .annotate(&frame, Some(&result), AnnotationOptions::default())
            .unwrap();
        assert_eq!(*out.image().get_pixel(15, 15), class_color(2));
    }
}
