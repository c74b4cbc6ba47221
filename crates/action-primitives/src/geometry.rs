//! Swipe coordinate math
//!
//! Screen swipes start at 80% (up/left) or 20% (down/right) of the axis and
//! travel `distance` of it. Area swipes start 10% inside the element and end
//! `1 - distance` of the span from the opposite edge.

use device_adapter::{Direction, Rect};

pub type Point = (i32, i32);

fn at(origin: i32, span: i32, fraction: f64) -> i32 {
    origin + (span as f64 * fraction.clamp(0.0, 1.0)).round() as i32
}

/// Start and end of a swipe across the whole viewport.
pub fn screen_swipe(viewport: Rect, direction: Direction, distance: f64) -> (Point, Point) {
    let (cx, cy) = viewport.center();
    let (w, h) = (viewport.width(), viewport.height());
    let (left, top) = (viewport.left, viewport.top);
    match direction {
        Direction::Up => ((cx, at(top, h, 0.8)), (cx, at(top, h, 0.8 - distance))),
        Direction::Down => ((cx, at(top, h, 0.2)), (cx, at(top, h, 0.2 + distance))),
        Direction::Left => ((at(left, w, 0.8), cy), (at(left, w, 0.8 - distance), cy)),
        Direction::Right => ((at(left, w, 0.2), cy), (at(left, w, 0.2 + distance), cy)),
    }
}

/// Start and end of a swipe inside `bounds`.
pub fn area_swipe(bounds: Rect, direction: Direction, distance: f64) -> (Point, Point) {
    let (cx, cy) = bounds.center();
    let (w, h) = (bounds.width(), bounds.height());
    let rest = 1.0 - distance;
    match direction {
        Direction::Up => (
            (cx, at(bounds.top, h, 0.9)),
            (cx, at(bounds.top, h, rest)),
        ),
        Direction::Down => (
            (cx, at(bounds.top, h, 0.1)),
            (cx, at(bounds.top, h, distance)),
        ),
        Direction::Left => (
            (at(bounds.left, w, 0.9), cy),
            (at(bounds.left, w, rest), cy),
        ),
        Direction::Right => (
            (at(bounds.left, w, 0.1), cy),
            (at(bounds.left, w, distance), cy),
        ),
    }
}

/// Pull-down from near the top edge.
pub fn refresh_swipe(viewport: Rect, area: Option<Rect>) -> (Point, Point) {
    match area {
        Some(bounds) => area_swipe(bounds, Direction::Down, 0.5),
        None => {
            let (cx, _) = viewport.center();
            let h = viewport.height();
            ((cx, at(viewport.top, h, 0.1)), (cx, at(viewport.top, h, 0.6)))
        }
    }
}
