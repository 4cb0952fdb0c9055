// THEORY:
// The compute boundary is the contract between this crate and the opaque numeric
// simulation. The simulation itself is somebody else's code; what lives here is
// only what crosses the line:
//
// 1.  **Going in**: the assembled `Volume` (borrowed, read-only, for the whole
//     duration of the call) and a pipe-delimited parameter string
//     `angles|res|na|outputType|n0`, e.g. `0,0|0.1,0.1,0.1|0.65|1|1.33`.
// 2.  **Coming out**: a `ResultArray` (real H×W float32, or complex H×W as
//     interleaved float32 pairs) plus a min/max `ValueRange` used for display.
// 3.  **Failure**: a `ComputeError`. The boundary never retries and never
//     cancels; callers decide what happens next.

use crate::core_modules::volume_assembler::Volume;
use crate::error::{ComputeError, ParamError};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Which quantity the simulation should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputType {
    Amplitude,
    #[default]
    Intensity,
    Complex,
}

impl OutputType {
    /// Selector value used in the parameter string.
    pub fn selector(&self) -> u8 {
        match self {
            Self::Amplitude => 0,
            Self::Intensity => 1,
            Self::Complex => 2,
        }
    }

    pub fn from_selector(selector: &str) -> Result<Self, ParamError> {
        match selector.trim() {
            "0" => Ok(Self::Amplitude),
            "1" => Ok(Self::Intensity),
            "2" => Ok(Self::Complex),
            other => Err(ParamError::OutputType(other.to_string())),
        }
    }
}

impl FromStr for OutputType {
    type Err = ParamError;

    /// Accepts either the selector digit or the name (`amplitude`, `intensity`, `complex`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amplitude" => Ok(Self::Amplitude),
            "intensity" => Ok(Self::Intensity),
            "complex" => Ok(Self::Complex),
            other => Self::from_selector(other),
        }
    }
}

/// Parameters forwarded to the simulation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationParams {
    /// Illumination angles as (x, y) pairs; the UI supplies exactly one.
    pub angles: Vec<(f32, f32)>,
    /// Voxel resolution along the three axes.
    pub resolution: [f32; 3],
    pub numerical_aperture: f32,
    pub output_type: OutputType,
    /// Refractive index of the background medium.
    pub background_index: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            angles: vec![(0.0, 0.0)],
            resolution: [0.1, 0.1, 0.1],
            numerical_aperture: 0.65,
            output_type: OutputType::Intensity,
            background_index: 1.33,
        }
    }
}

fn parse_number(token: &str) -> Option<f32> {
    token.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Parses an `x,y` angle pair.
pub fn parse_angle(token: &str) -> Result<(f32, f32), ParamError> {
    let parts: Vec<&str> = token.split(',').collect();
    match parts.as_slice() {
        [x, y] => match (parse_number(x), parse_number(y)) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(ParamError::Angle(token.to_string())),
        },
        _ => Err(ParamError::Angle(token.to_string())),
    }
}

/// Parses exactly three comma-separated numbers.
pub fn parse_resolution(token: &str) -> Result<[f32; 3], ParamError> {
    let values: Option<Vec<f32>> = token.split(',').map(parse_number).collect();
    match values.as_deref() {
        Some(&[x, y, z]) => Ok([x, y, z]),
        _ => Err(ParamError::Resolution(token.to_string())),
    }
}

impl SimulationParams {
    /// Checks the values a parameter string could not have carried.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.angles.is_empty() {
            return Err(ParamError::Angle(String::new()));
        }
        if let Some((x, y)) = self
            .angles
            .iter()
            .find(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(ParamError::Angle(format!("{x},{y}")));
        }
        if self.resolution.iter().any(|r| !r.is_finite()) {
            let [x, y, z] = self.resolution;
            return Err(ParamError::Resolution(format!("{x},{y},{z}")));
        }
        if !self.numerical_aperture.is_finite() {
            return Err(ParamError::NumericalAperture(self.numerical_aperture.to_string()));
        }
        if !self.background_index.is_finite() {
            return Err(ParamError::BackgroundIndex(self.background_index.to_string()));
        }
        Ok(())
    }

    /// Renders the pipe-delimited parameter string.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SimulationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let angles: Vec<String> = self.angles.iter().map(|(x, y)| format!("{x},{y}")).collect();
        let [rx, ry, rz] = self.resolution;
        write!(
            f,
            "{}|{rx},{ry},{rz}|{}|{}|{}",
            angles.join(";"),
            self.numerical_aperture,
            self.output_type.selector(),
            self.background_index
        )
    }
}

impl FromStr for SimulationParams {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split('|').collect();
        let [angles, resolution, na, output_type, n0] = fields.as_slice() else {
            return Err(ParamError::FieldCount(fields.len()));
        };

        let angles = angles
            .split(';')
            .map(parse_angle)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            angles,
            resolution: parse_resolution(resolution)?,
            numerical_aperture: parse_number(na)
                .ok_or_else(|| ParamError::NumericalAperture(na.to_string()))?,
            output_type: OutputType::from_selector(output_type)?,
            background_index: parse_number(n0)
                .ok_or_else(|| ParamError::BackgroundIndex(n0.to_string()))?,
        })
    }
}

/// The array a simulation returns, always of logical shape (height, width).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultArray {
    Real {
        height: usize,
        width: usize,
        data: Vec<f32>,
    },
    /// `data` holds interleaved (real, imaginary) pairs, 2·H·W floats.
    Complex {
        height: usize,
        width: usize,
        data: Vec<f32>,
    },
}

impl ResultArray {
    pub fn real(height: usize, width: usize, data: Vec<f32>) -> Result<Self, ComputeError> {
        if data.len() != height * width {
            return Err(ComputeError::MalformedResult(format!(
                "real result of shape ({height}, {width}) needs {} values, got {}",
                height * width,
                data.len()
            )));
        }
        Ok(Self::Real { height, width, data })
    }

    pub fn complex(height: usize, width: usize, data: Vec<f32>) -> Result<Self, ComputeError> {
        if data.len() != 2 * height * width {
            return Err(ComputeError::MalformedResult(format!(
                "complex result of shape ({height}, {width}) needs {} values, got {}",
                2 * height * width,
                data.len()
            )));
        }
        Ok(Self::Complex { height, width, data })
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Real { height, .. } | Self::Complex { height, .. } => *height,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::Real { width, .. } | Self::Complex { width, .. } => *width,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex { .. })
    }

    /// The raw float32 values (interleaved pairs for complex arrays).
    pub fn as_slice(&self) -> &[f32] {
        match self {
            Self::Real { data, .. } | Self::Complex { data, .. } => data,
        }
    }

    /// Min/max over real values, or over magnitudes for complex arrays.
    pub fn value_range(&self) -> ValueRange {
        match self {
            Self::Real { data, .. } => ValueRange::of(data.iter().copied()),
            Self::Complex { data, .. } => ValueRange::of(
                data.chunks_exact(2)
                    .map(|pair| pair[0].hypot(pair[1])),
            ),
        }
    }
}

/// Display statistics reported next to a result.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Range of `values`; an empty sequence yields (0, 0).
    pub fn of(values: impl IntoIterator<Item = f32>) -> Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return Self { min: 0.0, max: 0.0 };
        };
        iter.fold(Self { min: first, max: first }, |range, v| Self {
            min: range.min.min(v),
            max: range.max.max(v),
        })
    }
}

/// What a successful simulation hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOutput {
    pub result: ResultArray,
    pub range: ValueRange,
}

impl ComputeOutput {
    /// Wraps `result`, computing its range.
    pub fn new(result: ResultArray) -> Self {
        let range = result.value_range();
        Self { result, range }
    }
}

/// The opaque numeric procedure.
///
/// Implementations get shared, read-only access to the volume for the duration
/// of the call and must not retain it afterwards.
#[async_trait]
pub trait ComputeProcedure: Send + Sync {
    async fn run(&self, volume: &Volume, params: &str) -> Result<ComputeOutput, ComputeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_params_encode_like_the_ui() {
        assert_eq!(SimulationParams::default().encode(), "0,0|0.1,0.1,0.1|0.65|1|1.33");
    }

    #[test]
    fn parses_and_reencodes() {
        let params: SimulationParams = "-0.49,0.33|0.1,0.2,0.3|0.65|2|1.33".parse().unwrap();
        assert_eq!(params.angles, vec![(-0.49, 0.33)]);
        assert_eq!(params.resolution, [0.1, 0.2, 0.3]);
        assert_eq!(params.output_type, OutputType::Complex);
        assert_eq!(params.encode(), "-0.49,0.33|0.1,0.2,0.3|0.65|2|1.33");
    }

    #[test]
    fn several_angles_are_semicolon_separated() {
        let params: SimulationParams = "0,0;0.5,-0.5|0.1,0.1,0.1|0.65|0|1.33".parse().unwrap();
        assert_eq!(params.angles, vec![(0.0, 0.0), (0.5, -0.5)]);
        assert_eq!(params.output_type, OutputType::Amplitude);
    }

    #[test]
    fn rejects_malformed_fields() {
        assert_eq!(
            "0,0|0.1,0.1|0.65|1|1.33".parse::<SimulationParams>(),
            Err(ParamError::Resolution("0.1,0.1".to_string()))
        );
        assert_eq!(
            "0,0|0.1,0.1,0.1|abc|1|1.33".parse::<SimulationParams>(),
            Err(ParamError::NumericalAperture("abc".to_string()))
        );
        assert_eq!(
            "0,0|0.1,0.1,0.1|0.65|3|1.33".parse::<SimulationParams>(),
            Err(ParamError::OutputType("3".to_string()))
        );
        assert_eq!(
            "0|0.1,0.1,0.1|0.65|1|1.33".parse::<SimulationParams>(),
            Err(ParamError::Angle("0".to_string()))
        );
        assert_eq!(
            "0,0|0.1,0.1,0.1|0.65|1".parse::<SimulationParams>(),
            Err(ParamError::FieldCount(4))
        );
        assert_eq!(
            "0,0|0.1,0.1,0.1|0.65|1|NaN".parse::<SimulationParams>(),
            Err(ParamError::BackgroundIndex("NaN".to_string()))
        );
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let mut params = SimulationParams::default();
        assert_eq!(params.validate(), Ok(()));

        params.numerical_aperture = f32::NAN;
        assert!(matches!(params.validate(), Err(ParamError::NumericalAperture(_))));

        let params = SimulationParams {
            angles: Vec::new(),
            ..SimulationParams::default()
        };
        assert!(matches!(params.validate(), Err(ParamError::Angle(_))));
    }

    #[test]
    fn output_type_accepts_names_and_selectors() {
        assert_eq!("complex".parse::<OutputType>(), Ok(OutputType::Complex));
        assert_eq!("Amplitude".parse::<OutputType>(), Ok(OutputType::Amplitude));
        assert_eq!("1".parse::<OutputType>(), Ok(OutputType::Intensity));
        assert!("phase".parse::<OutputType>().is_err());
    }

    #[test]
    fn result_arrays_check_their_length() {
        assert!(ResultArray::real(2, 2, vec![0.0; 3]).is_err());
        assert!(ResultArray::complex(2, 2, vec![0.0; 4]).is_err());

        let complex = ResultArray::complex(1, 2, vec![3.0, 4.0, 0.0, 1.0]).unwrap();
        assert!(complex.is_complex());
        assert_eq!((complex.height(), complex.width()), (1, 2));
        assert_eq!(complex.value_range(), ValueRange { min: 1.0, max: 5.0 });
    }

    #[test]
    fn value_range_of_real_values() {
        let real = ResultArray::real(1, 3, vec![2.0, -1.0, 7.5]).unwrap();
        assert_eq!(ComputeOutput::new(real).range, ValueRange { min: -1.0, max: 7.5 });
        assert_eq!(ValueRange::of(Vec::new()), ValueRange { min: 0.0, max: 0.0 });
    }
}
