use serde::Deserialize;
use serde::Serialize;

/// Outcome code of one command or one batch item.
///
/// Positive values come from the server, negative values are produced on the
/// client side. There is deliberately no "unset" variant: a code only exists
/// once an outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Ok,
    ServerError,
    KeyNotFound,
    GenerationError,
    ParameterError,
    KeyExists,
    BinExists,
    Timeout,
    BinTypeError,
    RecordTooBig,
    FilteredOut,
    UdfFailure,
    IndexAlreadyExists,
    IndexNotFound,
    /// Client side: the node serving the key could not be reached
    ServerNotAvailable,
    /// Client side: the command could not be scheduled
    NoMoreConnections,
    /// Client side: no answer was ever received for the item
    NoResponse,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Ok
    }

    /// Integer code as carried on the wire
    pub fn as_i32(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::ServerError => 1,
            ResultCode::KeyNotFound => 2,
            ResultCode::GenerationError => 3,
            ResultCode::ParameterError => 4,
            ResultCode::KeyExists => 5,
            ResultCode::BinExists => 6,
            ResultCode::Timeout => 9,
            ResultCode::BinTypeError => 12,
            ResultCode::RecordTooBig => 13,
            ResultCode::FilteredOut => 27,
            ResultCode::UdfFailure => 100,
            ResultCode::IndexAlreadyExists => 200,
            ResultCode::IndexNotFound => 201,
            ResultCode::ServerNotAvailable => -8,
            ResultCode::NoMoreConnections => -7,
            ResultCode::NoResponse => -15,
        }
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = i32;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        Ok(match code {
            0 => ResultCode::Ok,
            1 => ResultCode::ServerError,
            2 => ResultCode::KeyNotFound,
            3 => ResultCode::GenerationError,
            4 => ResultCode::ParameterError,
            5 => ResultCode::KeyExists,
            6 => ResultCode::BinExists,
            9 => ResultCode::Timeout,
            12 => ResultCode::BinTypeError,
            13 => ResultCode::RecordTooBig,
            27 => ResultCode::FilteredOut,
            100 => ResultCode::UdfFailure,
            200 => ResultCode::IndexAlreadyExists,
            201 => ResultCode::IndexNotFound,
            -8 => ResultCode::ServerNotAvailable,
            -7 => ResultCode::NoMoreConnections,
            -15 => ResultCode::NoResponse,
            other => return Err(other),
        })
    }
}
