//! Target-region confirmation for decoded barcodes
//!
//! A detection only counts when the centroid of its corner points, mapped from
//! frame coordinates onto the rendered video surface, falls inside the scan
//! window the user aligns the barcode with.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A 2-D point in either frame or screen space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The on-screen scan window, in the coordinate space of the rendered video surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRegion {
    /// Left edge
    pub left: f64,
    /// Top edge
    pub top: f64,
    /// Width of the window
    pub width: f64,
    /// Height of the window
    pub height: f64,
}

impl TargetRegion {
    /// Create a new target region
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Closed-rectangle containment; points on an edge are inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}

/// Bounding box of the rendered video surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBox {
    /// Left edge
    pub left: f64,
    /// Top edge
    pub top: f64,
    /// Displayed width
    pub width: f64,
    /// Displayed height
    pub height: f64,
}

impl DisplayBox {
    /// Create a display box
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Coordinate space the decoder reports points in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Native frame pixels
    #[default]
    Pixel,
    /// Fractions of the frame size in `[0, 1]`
    Normalized,
}

/// Mapping from decoder frame coordinates to on-screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    /// Where the video is drawn
    pub display: DisplayBox,
    /// Native frame width in pixels
    pub native_width: u32,
    /// Native frame height in pixels
    pub native_height: u32,
    /// Space of incoming points
    pub space: CoordinateSpace,
    /// Video is drawn mirrored left-to-right
    pub mirrored: bool,
}

impl ViewportTransform {
    /// Pixel-space transform for a video of `native_width x native_height` drawn into `display`
    pub fn new(display: DisplayBox, native_width: u32, native_height: u32) -> Self {
        Self {
            display,
            native_width,
            native_height,
            space: CoordinateSpace::Pixel,
            mirrored: false,
        }
    }

    /// Transform where the displayed size equals the native size at the origin
    pub fn identity(native_width: u32, native_height: u32) -> Self {
        Self::new(
            DisplayBox::new(0.0, 0.0, native_width as f64, native_height as f64),
            native_width,
            native_height,
        )
    }

    /// Set the coordinate space of incoming points
    pub fn with_space(mut self, space: CoordinateSpace) -> Self {
        self.space = space;
        self
    }

    /// Set horizontal mirroring
    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    fn scale(&self) -> Option<(f64, f64)> {
        if self.display.width <= 0.0 || self.display.height <= 0.0 {
            return None;
        }
        match self.space {
            CoordinateSpace::Pixel => {
                if self.native_width == 0 || self.native_height == 0 {
                    return None;
                }
                Some((
                    self.display.width / self.native_width as f64,
                    self.display.height / self.native_height as f64,
                ))
            }
            CoordinateSpace::Normalized => Some((self.display.width, self.display.height)),
        }
    }

    /// Map a frame point onto the screen. `None` when the transform is degenerate.
    pub fn map(&self, point: Point) -> Option<Point> {
        let (sx, sy) = self.scale()?;
        let x = if self.mirrored {
            self.display.left + self.display.width - point.x * sx
        } else {
            self.display.left + point.x * sx
        };
        Some(Point::new(x, self.display.top + point.y * sy))
    }
}

/// Unweighted arithmetic mean of the points
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Decide whether a detection with the given corner points lies inside the target region.
///
/// Fewer than two points never counts as a detection.
pub fn is_within_target(
    points: &[Point],
    region: &TargetRegion,
    transform: &ViewportTransform,
) -> bool {
    if points.len() < 2 {
        return false;
    }
    let Some(center) = centroid(points) else {
        return false;
    };
    match transform.map(center) {
        Some(mapped) => region.contains(mapped),
        None => false,
    }
}

/// The UI's current layout: where the video is drawn and where the scan window sits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Scan window
    pub region: TargetRegion,
    /// Rendered video surface
    pub display: DisplayBox,
}

impl Layout {
    /// Video drawn at native size, scan window covering the whole frame
    pub fn full_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            region: TargetRegion::new(0.0, 0.0, w, h),
            display: DisplayBox::new(0.0, 0.0, w, h),
        }
    }

    /// Video drawn at native size with a centered scan window of the given fractions.
    ///
    /// Fractions are clamped to `(0, 1]`.
    pub fn centered(width: u32, height: u32, width_fraction: f64, height_fraction: f64) -> Self {
        let (w, h) = (width as f64, height as f64);
        let fw = clamp_fraction(width_fraction);
        let fh = clamp_fraction(height_fraction);
        let rw = w * fw;
        let rh = h * fh;
        Self {
            region: TargetRegion::new((w - rw) / 2.0, (h - rh) / 2.0, rw, rh),
            display: DisplayBox::new(0.0, 0.0, w, h),
        }
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(1.0)
    } else {
        1.0
    }
}

/// Read access to the current layout. `None` means the video surface is gone.
///
/// The native frame size is passed in so layouts can be derived from the stream.
pub trait Viewport: Send + Sync {
    /// Snapshot of the current layout
    fn layout(&self, native_width: u32, native_height: u32) -> Option<Layout>;
}

/// A viewport whose layout never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedViewport(pub Layout);

impl Viewport for FixedViewport {
    fn layout(&self, _native_width: u32, _native_height: u32) -> Option<Layout> {
        Some(self.0)
    }
}

/// Video drawn at native size with a centered scan window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenteredViewport {
    /// Window width as a fraction of the frame width
    pub width_fraction: f64,
    /// Window height as a fraction of the frame height
    pub height_fraction: f64,
}

impl Viewport for CenteredViewport {
    fn layout(&self, native_width: u32, native_height: u32) -> Option<Layout> {
        Some(Layout::centered(
            native_width,
            native_height,
            self.width_fraction,
            self.height_fraction,
        ))
    }
}

impl Viewport for watch::Receiver<Option<Layout>> {
    fn layout(&self, _native_width: u32, _native_height: u32) -> Option<Layout> {
        *self.borrow()
    }
}
