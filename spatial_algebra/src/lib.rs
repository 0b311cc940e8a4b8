use mass_properties::MassProperties;
use nalgebra::{Isometry3, Matrix3, Matrix6, Vector3, Vector6};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Plucker coordinates: the rotational part first, the translational part second.
/// For motion that is [angular velocity; linear velocity of the frame origin],
/// for force it is [moment about the frame origin; force].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpatialVector {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl SpatialVector {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn zeros() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    pub fn vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.rotation[0],
            self.rotation[1],
            self.rotation[2],
            self.translation[0],
            self.translation[1],
            self.translation[2],
        )
    }

    ///Featherstone 2.34
    pub fn cross_force(self, rhs: SpatialVector) -> SpatialVector {
        let new_rotation =
            self.rotation.cross(&rhs.rotation) + self.translation.cross(&rhs.translation);
        let new_translation = self.rotation.cross(&rhs.translation);
        SpatialVector::new(new_rotation, new_translation)
    }

    /// Featherstone 2.33
    pub fn cross_motion(self, rhs: SpatialVector) -> SpatialVector {
        let new_rotation = self.rotation.cross(&rhs.rotation);
        let new_translation =
            self.rotation.cross(&rhs.translation) + self.translation.cross(&rhs.rotation);
        SpatialVector::new(new_rotation, new_translation)
    }

    /// Scalar product between a motion and a force (power).
    pub fn dot(&self, rhs: &SpatialVector) -> f64 {
        self.rotation.dot(&rhs.rotation) + self.translation.dot(&rhs.translation)
    }
}

impl From<Vector6<f64>> for SpatialVector {
    fn from(v: Vector6<f64>) -> SpatialVector {
        SpatialVector::new(
            Vector3::new(v[0], v[1], v[2]),
            Vector3::new(v[3], v[4], v[5]),
        )
    }
}

impl Add<SpatialVector> for SpatialVector {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.rotation + rhs.rotation,
            self.translation + rhs.translation,
        )
    }
}

impl Sub<SpatialVector> for SpatialVector {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.rotation - rhs.rotation,
            self.translation - rhs.translation,
        )
    }
}

impl Neg for SpatialVector {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.rotation, -self.translation)
    }
}

impl Mul<f64> for SpatialVector {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.rotation * rhs, self.translation * rhs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionVector(pub SpatialVector);

impl MotionVector {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self(SpatialVector::new(rotation, translation))
    }

    pub fn rotation(&self) -> &Vector3<f64> {
        &self.0.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.0.translation
    }

    pub fn vector(&self) -> Vector6<f64> {
        self.0.vector()
    }

    pub fn cross_motion(self, rhs: MotionVector) -> MotionVector {
        MotionVector(self.0.cross_motion(rhs.0))
    }

    pub fn cross_force(self, rhs: ForceVector) -> ForceVector {
        ForceVector(self.0.cross_force(rhs.0))
    }

    pub fn dot(&self, force: &ForceVector) -> f64 {
        self.0.dot(&force.0)
    }
}

impl Add<MotionVector> for MotionVector {
    type Output = MotionVector;
    #[inline]
    fn add(self, rhs: MotionVector) -> MotionVector {
        MotionVector(self.0 + rhs.0)
    }
}

impl Sub<MotionVector> for MotionVector {
    type Output = MotionVector;
    #[inline]
    fn sub(self, rhs: MotionVector) -> MotionVector {
        MotionVector(self.0 - rhs.0)
    }
}

impl Mul<f64> for MotionVector {
    type Output = MotionVector;
    #[inline]
    fn mul(self, rhs: f64) -> MotionVector {
        MotionVector(self.0 * rhs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity(MotionVector);

impl Velocity {
    pub fn zeros() -> Self {
        Self(MotionVector(SpatialVector::zeros()))
    }

    pub fn vector(&self) -> Vector6<f64> {
        self.0.vector()
    }

    pub fn motion(&self) -> &MotionVector {
        &self.0
    }

    /// Velocity-product term v x vj, an acceleration.
    pub fn cross_motion(self, rhs: Velocity) -> Acceleration {
        Acceleration(self.0.cross_motion(rhs.0))
    }

    pub fn cross_force(self, rhs: Momentum) -> Force {
        Force(self.0.cross_force(rhs.0))
    }
}

impl From<MotionVector> for Velocity {
    fn from(motion: MotionVector) -> Self {
        Self(motion)
    }
}

impl Add<Velocity> for Velocity {
    type Output = Velocity;
    #[inline]
    fn add(self, rhs: Velocity) -> Velocity {
        Velocity(self.0 + rhs.0)
    }
}

impl Sub<Velocity> for Velocity {
    type Output = Velocity;
    #[inline]
    fn sub(self, rhs: Velocity) -> Velocity {
        Velocity(self.0 - rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Acceleration(MotionVector);

impl Acceleration {
    pub fn zeros() -> Self {
        Self(MotionVector(SpatialVector::zeros()))
    }

    /// A pure linear acceleration of the frame origin.
    pub fn linear(a: Vector3<f64>) -> Self {
        Self(MotionVector::new(Vector3::zeros(), a))
    }

    pub fn vector(&self) -> Vector6<f64> {
        self.0.vector()
    }

    pub fn motion(&self) -> &MotionVector {
        &self.0
    }
}

impl From<MotionVector> for Acceleration {
    fn from(motion: MotionVector) -> Self {
        Self(motion)
    }
}

impl Add<Acceleration> for Acceleration {
    type Output = Acceleration;
    #[inline]
    fn add(self, rhs: Acceleration) -> Acceleration {
        Acceleration(self.0 + rhs.0)
    }
}

impl Sub<Acceleration> for Acceleration {
    type Output = Acceleration;
    #[inline]
    fn sub(self, rhs: Acceleration) -> Acceleration {
        Acceleration(self.0 - rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceVector(pub SpatialVector);

impl ForceVector {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self(SpatialVector::new(rotation, translation))
    }

    pub fn vector(&self) -> Vector6<f64> {
        self.0.vector()
    }
}

impl Add<ForceVector> for ForceVector {
    type Output = ForceVector;
    #[inline]
    fn add(self, rhs: ForceVector) -> ForceVector {
        ForceVector(self.0 + rhs.0)
    }
}

impl Sub<ForceVector> for ForceVector {
    type Output = ForceVector;
    #[inline]
    fn sub(self, rhs: ForceVector) -> ForceVector {
        ForceVector(self.0 - rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Momentum(ForceVector);

impl From<ForceVector> for Momentum {
    fn from(force: ForceVector) -> Self {
        Self(force)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Force(ForceVector);

impl Force {
    pub fn zeros() -> Self {
        Self(ForceVector(SpatialVector::zeros()))
    }

    /// Builds a spatial force from a linear force and a moment about the frame origin.
    pub fn from_wrench(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self(ForceVector::new(torque, force))
    }

    pub fn force(&self) -> &Vector3<f64> {
        &self.0 .0.translation
    }

    pub fn torque(&self) -> &Vector3<f64> {
        &self.0 .0.rotation
    }

    pub fn vector(&self) -> Vector6<f64> {
        self.0.vector()
    }

    pub fn force_vector(&self) -> &ForceVector {
        &self.0
    }
}

impl From<ForceVector> for Force {
    fn from(force: ForceVector) -> Self {
        Self(force)
    }
}

impl Add<Force> for Force {
    type Output = Force;
    #[inline]
    fn add(self, rhs: Force) -> Force {
        Force(self.0 + rhs.0)
    }
}

impl AddAssign<Force> for Force {
    #[inline]
    fn add_assign(&mut self, rhs: Force) {
        *self = *self + rhs;
    }
}

impl Sub<Force> for Force {
    type Output = Force;
    #[inline]
    fn sub(self, rhs: Force) -> Force {
        Force(self.0 - rhs.0)
    }
}

/// Coordinate transform between two frames.
///
/// We use the terminology b_from_a so that notation matches matrix multiplication,
/// i.e. v_c = c_from_b * b_from_a * v_a. The wrapped isometry maps point
/// coordinates of frame a into frame b: p_b = R * p_a + p.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialTransform(pub Isometry3<f64>);

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpatialTransform {
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    #[inline]
    pub fn inv(&self) -> SpatialTransform {
        SpatialTransform(self.0.inverse())
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.0
    }
}

impl From<Isometry3<f64>> for SpatialTransform {
    #[inline]
    fn from(value: Isometry3<f64>) -> Self {
        Self(value)
    }
}

impl Mul<MotionVector> for SpatialTransform {
    type Output = MotionVector;
    fn mul(self, motion: MotionVector) -> MotionVector {
        let r = self.0.rotation;
        let p = self.0.translation.vector;

        let rotation = r * motion.0.rotation;
        let translation = r * motion.0.translation + p.cross(&rotation);
        MotionVector::new(rotation, translation)
    }
}

impl Mul<Velocity> for SpatialTransform {
    type Output = Velocity;
    #[inline]
    fn mul(self, velocity: Velocity) -> Velocity {
        Velocity(self * velocity.0)
    }
}

impl Mul<Acceleration> for SpatialTransform {
    type Output = Acceleration;
    #[inline]
    fn mul(self, acceleration: Acceleration) -> Acceleration {
        Acceleration(self * acceleration.0)
    }
}

impl Mul<ForceVector> for SpatialTransform {
    type Output = ForceVector;
    fn mul(self, force: ForceVector) -> ForceVector {
        let r = self.0.rotation;
        let p = self.0.translation.vector;

        let translation = r * force.0.translation;
        let rotation = r * force.0.rotation + p.cross(&translation);
        ForceVector::new(rotation, translation)
    }
}

impl Mul<Force> for SpatialTransform {
    type Output = Force;
    #[inline]
    fn mul(self, force: Force) -> Force {
        Force(self * force.0)
    }
}

impl Mul<SpatialTransform> for SpatialTransform {
    type Output = SpatialTransform;
    #[inline]
    fn mul(self, rhs: SpatialTransform) -> SpatialTransform {
        SpatialTransform(self.0 * rhs.0)
    }
}

fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

/// Rigid body inertia expressed at the body frame origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpatialInertia(pub MassProperties);

impl SpatialInertia {
    pub fn matrix(&self) -> Matrix6<f64> {
        let mp = self.0;
        let mass = mp.mass;
        let cx = skew(&mp.center_of_mass.vector());
        let cxt = cx.transpose();

        let mut m = Matrix6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(mp.inertia.matrix() + cx * cxt * mass));
        m.fixed_view_mut::<3, 3>(0, 3).copy_from(&(cx * mass));
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&(cxt * mass));
        m.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Matrix3::identity() * mass));
        m
    }
}

impl From<MassProperties> for SpatialInertia {
    fn from(value: MassProperties) -> SpatialInertia {
        SpatialInertia(value)
    }
}

impl Mul<SpatialVector> for SpatialInertia {
    type Output = SpatialVector;
    fn mul(self, v: SpatialVector) -> SpatialVector {
        SpatialVector::from(self.matrix() * v.vector())
    }
}

impl Mul<MotionVector> for SpatialInertia {
    type Output = ForceVector;
    fn mul(self, motion: MotionVector) -> ForceVector {
        ForceVector(self * motion.0)
    }
}

impl Mul<Velocity> for SpatialInertia {
    type Output = Momentum;
    fn mul(self, velocity: Velocity) -> Momentum {
        Momentum(self * velocity.0)
    }
}

impl Mul<Acceleration> for SpatialInertia {
    type Output = Force;
    fn mul(self, acceleration: Acceleration) -> Force {
        Force(self * acceleration.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use mass_properties::{CenterOfMass, Inertia};
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec_eq(a: &Vector3<f64>, b: &Vector3<f64>) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn test_motion_transform_pure_translation() {
        // frame a sits at +1 x in frame b, spinning about z
        let b_from_a = SpatialTransform::from(Isometry3::translation(1.0, 0.0, 0.0));
        let v_a = MotionVector::new(Vector3::z(), Vector3::zeros());
        let v_b = b_from_a * v_a;
        assert_vec_eq(v_b.rotation(), &Vector3::z());
        // origin of b is at -1 x from the spin axis, so it moves along -y
        assert_vec_eq(v_b.translation(), &Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_force_transform_moment_arm() {
        // a downward force at the origin of a, a is 2 m along x in b
        let b_from_a = SpatialTransform::from(Isometry3::translation(2.0, 0.0, 0.0));
        let f_a = Force::from_wrench(Vector3::new(0.0, 0.0, -10.0), Vector3::zeros());
        let f_b = b_from_a * f_a;
        assert_vec_eq(f_b.force(), &Vector3::new(0.0, 0.0, -10.0));
        assert_vec_eq(f_b.torque(), &Vector3::new(0.0, 20.0, 0.0));
    }

    #[test]
    fn test_transform_power_invariant() {
        let b_from_a = SpatialTransform::from(Isometry3::from_parts(
            Translation3::new(0.3, -1.2, 0.5),
            UnitQuaternion::from_euler_angles(0.2, -0.4, FRAC_PI_2),
        ));
        let v_a = MotionVector::new(Vector3::new(0.1, 0.2, 0.3), Vector3::new(-1.0, 0.5, 2.0));
        let f_a = ForceVector::new(Vector3::new(3.0, -1.0, 0.5), Vector3::new(0.7, 0.0, -2.0));
        let power_a = v_a.dot(&f_a);
        let power_b = (b_from_a * v_a).dot(&(b_from_a * f_a));
        assert_abs_diff_eq!(power_a, power_b, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_inverse_round_trip() {
        let b_from_a = SpatialTransform::from(Isometry3::from_parts(
            Translation3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.5, 0.1, -0.3),
        ));
        let v = MotionVector::new(Vector3::new(0.1, 0.2, 0.3), Vector3::new(1.0, -1.0, 0.5));
        let back = b_from_a.inv() * (b_from_a * v);
        assert_vec_eq(back.rotation(), v.rotation());
        assert_vec_eq(back.translation(), v.translation());
    }

    #[test]
    fn test_spatial_inertia_offset_point_mass() {
        let mp = MassProperties::new(2.0, CenterOfMass::new(1.0, 0.0, 0.0), Inertia::ZERO).unwrap();
        let inertia = SpatialInertia::from(mp);
        // linear acceleration up, the mass pushes back with a moment about the origin
        let f = inertia * Acceleration::linear(Vector3::new(0.0, 0.0, 9.8));
        assert_vec_eq(f.force(), &Vector3::new(0.0, 0.0, 19.6));
        assert_vec_eq(f.torque(), &Vector3::new(0.0, -19.6, 0.0));
    }

    #[test]
    fn test_cross_force_of_spinning_offset_mass() {
        let mp = MassProperties::new(1.0, CenterOfMass::new(1.0, 0.0, 0.0), Inertia::ZERO).unwrap();
        let inertia = SpatialInertia::from(mp);
        let v = Velocity::from(MotionVector::new(Vector3::z(), Vector3::zeros()));
        let f = v.cross_force(inertia * v);
        // centripetal force toward the spin axis
        assert_vec_eq(f.force(), &Vector3::new(-1.0, 0.0, 0.0));
        assert_vec_eq(f.torque(), &Vector3::zeros());
    }
}
