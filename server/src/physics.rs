use shared::{
    normalize_rotation, BULLET_SPEED, MELEE_HIT_RADIUS, MELEE_REACH,
    MUZZLE_OFFSET, PLAYER_SIZE, PLAYING_AREA_HEIGHT, PLAYING_AREA_WIDTH,
};

/// Angle between the player's facing and the gun barrel, in degrees.
const MUZZLE_ANGLE_OFFSET: f32 = 5.0;

///Represents a vector in 2D screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down.
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vector2) -> f32 {
        Vector2::new(self.x - other.x, self.y - other.y).magnitude()
    }
}

///Axis aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    ///Returns true if the two rectangles overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

///Centre of a player whose top-left corner is at (x, y).
pub fn player_center(x: i32, y: i32) -> Vector2 {
    let half = PLAYER_SIZE as f32 / 2.0;
    Vector2::new(x as f32 + half, y as f32 + half)
}

pub fn player_bounds(x: i32, y: i32) -> Rect {
    let size = PLAYER_SIZE as f32;
    Rect::new(x as f32, y as f32, size, size)
}

///Square hitbox around a bullet centred at `position`.
pub fn bullet_bounds(position: Vector2, radius: f32) -> Rect {
    Rect::new(
        position.x - radius,
        position.y - radius,
        radius * 2.0,
        radius * 2.0,
    )
}

pub fn in_playing_area(position: Vector2) -> bool {
    (0.0..=PLAYING_AREA_WIDTH).contains(&position.x)
        && (0.0..=PLAYING_AREA_HEIGHT).contains(&position.y)
}

/// Spawn point and velocity (units per second) of a bullet fired by a player
/// at (x, y) facing `rot` degrees.
pub fn bullet_launch(x: i32, y: i32, rot: f32) -> (Vector2, Vector2) {
    let angle = (-rot + MUZZLE_ANGLE_OFFSET).to_radians();
    let direction = Vector2::new(angle.cos(), -angle.sin());

    let spawn = player_center(x, y).add(&direction.scale(-MUZZLE_OFFSET));
    let velocity = direction.scale(-BULLET_SPEED);
    (spawn, velocity)
}

///Where the knife lands for a player at (x, y) facing `rot` degrees.
pub fn knife_point(x: i32, y: i32, rot: f32) -> Vector2 {
    let angle = normalize_rotation(rot + 180.0).to_radians();
    let reach = Vector2::new(angle.cos(), angle.sin()).scale(MELEE_REACH);
    player_center(x, y).add(&reach)
}

///Returns true if a knife swung from the attacker's pose lands on the target.
pub fn melee_hits(attacker: (i32, i32, f32), target: (i32, i32)) -> bool {
    let (ax, ay, rot) = attacker;
    let point = knife_point(ax, ay, rot);
    point.distance(&player_center(target.0, target.1)) <= MELEE_HIT_RADIUS
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 5.0, 5.0)));
        assert!(!a.intersects(&Rect::new(0.0, 20.0, 5.0, 5.0)));
    }

    #[test]
    fn test_player_center() {
        let c = player_center(100, 200);
        assert_approx_eq!(c.x, 150.0);
        assert_approx_eq!(c.y, 250.0);
    }

    #[test]
    fn test_bullet_launch_geometry() {
        let (spawn, velocity) = bullet_launch(100, 100, 0.0);
        let angle = 5.0f32.to_radians();

        assert_approx_eq!(spawn.x, 150.0 - angle.cos() * MUZZLE_OFFSET, 1e-3);
        assert_approx_eq!(spawn.y, 150.0 + angle.sin() * MUZZLE_OFFSET, 1e-3);
        assert_approx_eq!(velocity.magnitude(), BULLET_SPEED, 1e-2);
        // facing 0 fires towards negative x
        assert!(velocity.x < 0.0);
    }

    #[test]
    fn test_knife_point_faces_opposite_rotation() {
        let point = knife_point(0, 0, 0.0);
        assert_approx_eq!(point.x, 50.0 - MELEE_REACH, 1e-3);
        assert_approx_eq!(point.y, 50.0, 1e-3);

        let point = knife_point(0, 0, 90.0);
        assert_approx_eq!(point.x, 50.0, 1e-3);
        assert_approx_eq!(point.y, 50.0 - MELEE_REACH, 1e-3);
    }

    #[test]
    fn test_melee_range() {
        // knife lands at (70, 150); target centre at (50, 150)
        assert!(melee_hits((100, 100, 0.0), (0, 100)));
        // target centre at (250, 150) is behind the attacker
        assert!(!melee_hits((100, 100, 0.0), (200, 100)));
        assert!(!melee_hits((100, 100, 0.0), (-200, 100)));
    }

    #[test]
    fn test_playing_area_bounds() {
        assert!(in_playing_area(Vector2::new(0.0, 1000.0)));
        assert!(!in_playing_area(Vector2::new(-0.5, 10.0)));
        assert!(!in_playing_area(Vector2::new(10.0, 1000.5)));
    }
}
