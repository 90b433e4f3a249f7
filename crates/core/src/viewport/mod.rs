use serde::{Deserialize, Serialize};

/// Smallest zoom accepted by [`ViewportMapper::set_zoom`].
pub const MIN_ZOOM: f32 = 0.1;

/// Wheel delta that changes the zoom by one pixel per column.
const WHEEL_ZOOM_STEP: f32 = 3600.0;

/// Backward auto-scroll distance, in screen widths. Forward is one screen.
const BACKWARD_SCROLL_FACTOR: f64 = 1.6;

/// Snapshot of the visible window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub zoom_level: f32,
    pub offset_columns: usize,
    pub visible_columns: usize,
}

/// What [`ViewportMapper::follow`] did to keep the cursor on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    /// The cursor was already visible.
    Stay,
    /// The window jumped one screen width to the right.
    Forward,
    /// The window jumped 1.6 screen widths to the left.
    Backward,
}

/// Zoom and scroll state of the spectrogram view, with conversions between
/// screen pixels, spectrogram columns and audio time.
///
/// Every conversion is total: an empty spectrogram, a zero duration or a
/// zero width yields column 0 / time 0 instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportMapper {
    zoom: f32,
    offset: usize,
    width: f32,
    total_columns: usize,
    duration: f64,
}

impl Default for ViewportMapper {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ViewportMapper {
    pub fn new(width_pixels: f32) -> Self {
        Self {
            zoom: 1.0,
            offset: 0,
            width: sanitize(width_pixels),
            total_columns: 0,
            duration: 0.0,
        }
    }

    /// Points the viewport at a freshly loaded spectrogram.
    pub fn load(&mut self, total_columns: usize, duration_seconds: f64) {
        self.total_columns = total_columns;
        self.duration = if duration_seconds.is_finite() {
            duration_seconds.max(0.0)
        } else {
            0.0
        };
        self.clamp_offset();
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn total_columns(&self) -> usize {
        self.total_columns
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            zoom_level: self.zoom,
            offset_columns: self.offset,
            visible_columns: self.visible_columns(),
        }
    }

    pub fn set_width(&mut self, width_pixels: f32) {
        self.width = sanitize(width_pixels);
        self.clamp_offset();
    }

    /// `floor(width / zoom)` clamped to `[1, total_columns]`.
    pub fn visible_columns(&self) -> usize {
        if self.total_columns == 0 {
            return 0;
        }
        let columns = (self.width / self.zoom).floor();
        if columns.is_finite() {
            (columns as usize).clamp(1, self.total_columns)
        } else {
            self.total_columns
        }
    }

    fn max_offset(&self) -> usize {
        self.total_columns - self.visible_columns()
    }

    fn clamp_offset(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }

    /// Visible `[start, end)` column range.
    pub fn view_range(&self) -> (usize, usize) {
        let start = self.offset;
        (start, (start + self.visible_columns()).min(self.total_columns))
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
        self.clamp_offset();
    }

    pub fn scroll_by(&mut self, delta_columns: i64) {
        let target = (self.offset as i64).saturating_add(delta_columns);
        self.offset = target.clamp(0, self.max_offset() as i64) as usize;
    }

    /// Sets the zoom level, flooring it at [`MIN_ZOOM`].
    pub fn set_zoom(&mut self, zoom: f32) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom = zoom.max(MIN_ZOOM);
        self.clamp_offset();
    }

    /// Changes the zoom while keeping the column under `pointer_x` in place.
    pub fn zoom_at(&mut self, pointer_x: f32, zoom: f32) {
        if !zoom.is_finite() || zoom <= 0.0 || self.total_columns == 0 {
            return;
        }

        let pointer_column = self.pixel_to_column(pointer_x) as i64;
        let before = self.visible_columns();
        self.zoom = zoom;
        let after = self.visible_columns();

        let distance = (pointer_column - self.offset as i64) as f64;
        let scaled = (distance * (after as f64 / before as f64)) as i64;
        let target = pointer_column - scaled;
        self.offset = target.clamp(0, self.max_offset() as i64) as usize;
    }

    /// Mouse wheel zoom. The zoom never drops below the level at which the
    /// whole spectrogram fits the screen.
    pub fn wheel_zoom(&mut self, pointer_x: f32, wheel_delta: f32) {
        if self.total_columns == 0 {
            return;
        }
        let full_fit = self.width / self.total_columns as f32;
        let zoom = (self.zoom + wheel_delta / WHEEL_ZOOM_STEP).max(full_fit);
        self.zoom_at(pointer_x, zoom);
    }

    /// Mouse wheel scroll; one wheel unit moves one screen pixel.
    pub fn wheel_scroll(&mut self, wheel_delta: f32) {
        let columns = (-wheel_delta / self.zoom) as i64;
        self.scroll_by(columns);
    }

    pub fn pixel_to_column(&self, x: f32) -> usize {
        if self.total_columns == 0 || self.width <= 0.0 || !x.is_finite() {
            return self.offset;
        }
        let fraction = (x / self.width).clamp(0.0, 1.0);
        let column = self.offset + (fraction * self.visible_columns() as f32) as usize;
        column.min(self.total_columns - 1)
    }

    pub fn column_to_time(&self, column: f64) -> f64 {
        if self.total_columns == 0 || !column.is_finite() {
            return 0.0;
        }
        column.max(0.0) * self.duration / self.total_columns as f64
    }

    pub fn time_to_column(&self, seconds: f64) -> f64 {
        if self.duration <= 0.0 || !seconds.is_finite() {
            return 0.0;
        }
        seconds.max(0.0) / self.duration * self.total_columns as f64
    }

    /// Column of the playback cursor, kept inside the spectrogram.
    pub fn cursor_column(&self, seconds: f64) -> f64 {
        if self.total_columns == 0 {
            return 0.0;
        }
        self.time_to_column(seconds)
            .clamp(0.0, (self.total_columns - 1) as f64)
    }

    /// Screen x of a (fractional) column; may fall outside `[0, width)`.
    pub fn column_to_pixel(&self, column: f64) -> f32 {
        let visible = self.visible_columns();
        if visible == 0 {
            return 0.0;
        }
        ((column - self.offset as f64) / visible as f64 * self.width as f64) as f32
    }

    pub fn time_to_pixel(&self, seconds: f64) -> f32 {
        self.column_to_pixel(self.time_to_column(seconds))
    }

    /// Audio time under screen x, used when a marker is dropped.
    pub fn pixel_to_time(&self, x: f32) -> f64 {
        let visible = self.visible_columns();
        if visible == 0 || self.width <= 0.0 || !x.is_finite() {
            return self.column_to_time(self.offset as f64);
        }
        let column = self.offset as f64 + x as f64 / self.width as f64 * visible as f64;
        self.column_to_time(column)
    }

    /// Keeps the playback cursor on screen: when it leaves the window on the
    /// right the view advances one full screen, when it leaves on the left
    /// the view moves back 1.6 screens.
    pub fn follow(&mut self, seconds: f64) -> ScrollAction {
        if self.total_columns == 0 || self.duration <= 0.0 {
            return ScrollAction::Stay;
        }

        let cursor = self.cursor_column(seconds);
        let (start, end) = self.view_range();
        if cursor >= end as f64 {
            self.scroll_by((end - start) as i64);
            tracing::debug!(cursor, offset = self.offset, "cursor out of view, scrolling forward");
            ScrollAction::Forward
        } else if cursor < start as f64 {
            let delta = (BACKWARD_SCROLL_FACTOR * (start as f64 - end as f64)) as i64;
            self.scroll_by(delta);
            tracing::debug!(cursor, offset = self.offset, "cursor out of view, scrolling backward");
            ScrollAction::Backward
        } else {
            ScrollAction::Stay
        }
    }
}

fn sanitize(width: f32) -> f32 {
    if width.is_finite() {
        width.max(0.0)
    } else {
        0.0
    }
}
