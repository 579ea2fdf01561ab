/// The three medical planes a slice can be taken from.
///
/// The discriminants are the codes the slice kernel receives in its
/// uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Normal along the depth (z) axis.
    Axial = 0,
    /// Normal along the height (y) axis.
    Coronal = 1,
    /// Normal along the width (x) axis.
    Sagittal = 2,
}

impl Orientation {
    /// Decodes a raw orientation code. Every code other than 0 and 1 is
    /// read as [`Orientation::Sagittal`].
    #[inline]
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Orientation::Axial,
            1 => Orientation::Coronal,
            _ => Orientation::Sagittal,
        }
    }

    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Interpolation {
    /// Resample Coronal and Sagittal slices to isotropic dimensions.
    Linear(Processor),
    #[default]
    None,
}

/// Where the slice kernel is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Processor {
    #[default]
    CPU,
    GPU,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::Orientation;

    #[test]
    fn orientation_codes_round_trip() {
        for orientation in [
            Orientation::Axial,
            Orientation::Coronal,
            Orientation::Sagittal,
        ] {
            assert_eq!(Orientation::from_code(orientation.code()), orientation);
        }
    }

    #[test]
    fn unknown_codes_fall_back_to_sagittal() {
        assert_eq!(Orientation::from_code(3), Orientation::Sagittal);
        assert_eq!(Orientation::from_code(7), Orientation::Sagittal);
        assert_eq!(Orientation::from_code(u32::MAX), Orientation::Sagittal);
    }
}
