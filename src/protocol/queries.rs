use strum_macros::{Display, EnumIter};

/// S21 read queries used for polling.
///
/// The unit answers each query with a frame whose header is the query's
/// header with the first character incremented (`F1` -> `G1`, `RH` -> `SH`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter)]
pub enum Query {
    /// Basic state: power, mode, setpoint, fan
    F1,
    /// Swing state
    F5,
    /// Inside temperature
    RH,
    /// Coil temperature
    RI,
    /// Outside temperature
    Ra,
    /// Fan speed (rpm)
    RL,
    /// Compressor frequency
    Rd,
}

/// One full poll cycle, in order.
pub const QUERY_LIST: [Query; 7] = [
    Query::F1,
    Query::F5,
    Query::RH,
    Query::RI,
    Query::Ra,
    Query::RL,
    Query::Rd,
];

impl Query {
    pub fn code(&self) -> &'static [u8; 2] {
        match self {
            Query::F1 => b"F1",
            Query::F5 => b"F5",
            Query::RH => b"RH",
            Query::RI => b"RI",
            Query::Ra => b"Ra",
            Query::RL => b"RL",
            Query::Rd => b"Rd",
        }
    }

    /// Header of the frame the unit replies with.
    pub fn response_header(&self) -> [u8; 2] {
        let [a, b] = *self.code();
        [a + 1, b]
    }
}


#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_query_list_covers_every_query_in_order() {
        assert_eq!(Query::iter().collect::<Vec<_>>(), QUERY_LIST.to_vec());
    }

    #[test]
    fn test_response_header() {
        assert_eq!(&Query::F1.response_header(), b"G1");
        assert_eq!(&Query::RH.response_header(), b"SH");
        assert_eq!(&Query::Ra.response_header(), b"Sa");
        assert_eq!(Query::Rd.to_string(), "Rd");
    }
}
