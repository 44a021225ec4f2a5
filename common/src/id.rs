use serde::{Deserialize, Serialize};
use std::{fmt, str};

macro_rules! primitive_id {
    ($name:ident, $repr_type:ty) => {
        #[derive(
            Clone,
            Copy,
            Default,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub $repr_type);

        impl From<$name> for $repr_type {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$repr_type> for $name {
            fn from(repr: $repr_type) -> Self {
                Self(repr)
            }
        }

        impl str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = s.parse::<$repr_type>()?;
                Ok(Self(id))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

macro_rules! from_id_to_primitive {
    ($name:ident, $primitive:ty) => {
        impl From<$name> for $primitive {
            fn from(id: $name) -> Self {
                id.0 as $primitive
            }
        }
    };
}

primitive_id!(WorkerId, u32);
from_id_to_primitive!(WorkerId, usize);

impl WorkerId {
    /// Index of this worker's queue in the worker queue set
    pub fn index(self) -> usize {
        self.into()
    }

    /// Build a worker id from a hash value already reduced below the worker count
    pub fn from_slot(slot: u64) -> Self {
        Self(slot as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id() {
        let id = WorkerId::from_slot(7);
        assert_eq!(id, WorkerId(7));
        assert_eq!(id.index(), 7usize);
        assert_eq!(id.to_string(), "7");

        let parsed: WorkerId = "12".parse().unwrap();
        assert_eq!(parsed, WorkerId(12));
        assert!("twelve".parse::<WorkerId>().is_err());
    }

    #[test]
    fn test_worker_id_ordering() {
        let mut ids = vec![WorkerId(3), WorkerId(0), WorkerId(2)];
        ids.sort();
        assert_eq!(ids, vec![WorkerId(0), WorkerId(2), WorkerId(3)]);
    }
}
