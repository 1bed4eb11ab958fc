use acs::DtmfTone;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("could not determine DTMF tone from `{0}`")]
pub struct UnknownTone(pub String);

/// Converts a digit (`"1"`) or its tone name (`"one"`) into a [`DtmfTone`].
pub fn convert_to_dtmf_tone(tone: &str) -> Result<DtmfTone, UnknownTone> {
    match tone.trim().to_ascii_lowercase().as_str() {
        "0" | "zero" => Ok(DtmfTone::Zero),
        "1" | "one" => Ok(DtmfTone::One),
        "2" | "two" => Ok(DtmfTone::Two),
        "3" | "three" => Ok(DtmfTone::Three),
        "4" | "four" => Ok(DtmfTone::Four),
        "5" | "five" => Ok(DtmfTone::Five),
        "6" | "six" => Ok(DtmfTone::Six),
        "7" | "seven" => Ok(DtmfTone::Seven),
        "8" | "eight" => Ok(DtmfTone::Eight),
        "9" | "nine" => Ok(DtmfTone::Nine),
        _ => Err(UnknownTone(tone.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_digits_and_names() {
        assert_eq!(convert_to_dtmf_tone("1"), Ok(DtmfTone::One));
        assert_eq!(convert_to_dtmf_tone("Nine"), Ok(DtmfTone::Nine));
        assert_eq!(convert_to_dtmf_tone(" zero "), Ok(DtmfTone::Zero));
    }

    #[test]
    fn rejects_anything_else() {
        assert_eq!(
            convert_to_dtmf_tone("pound"),
            Err(UnknownTone("pound".to_string()))
        );
        assert!(convert_to_dtmf_tone("10").is_err());
    }
}
