use crate::err::{DecodeError, DecodeErrorKind};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QosLevel {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value {
            0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::QoS,
                    format!("invalid QoS {value}, only values 0-2 are valid"),
                ));
            }
        };
        return Ok(out);
    }
}

impl From<QosLevel> for u8 {
    fn from(value: QosLevel) -> Self {
        value as u8
    }
}

/// Maximum QoS granted for a subscription, or outright refusal (§4.4
/// SUBACK reason codes).
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum SubAckQos {
    Granted(QosLevel),
    Err,
}

impl From<QosLevel> for SubAckQos {
    fn from(value: QosLevel) -> Self {
        return Self::Granted(value);
    }
}

impl From<SubAckQos> for u8 {
    fn from(value: SubAckQos) -> Self {
        match value {
            SubAckQos::Err => 0b1000_0000,
            SubAckQos::Granted(qos) => qos as u8,
        }
    }
}

impl TryFrom<u8> for SubAckQos {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == 0b1000_0000 {
            return Ok(Self::Err);
        }
        return Ok(Self::Granted(QosLevel::try_from(value)?));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_qos() {
        assert!(QosLevel::try_from(3).is_err());
    }

    #[test]
    fn suback_err_roundtrips_through_the_reserved_bit() {
        let encoded: u8 = SubAckQos::Err.into();
        assert_eq!(encoded, 0x80);
        assert_eq!(SubAckQos::try_from(0x80).unwrap(), SubAckQos::Err);
    }
}
