use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw ID value
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a service category
    CategoryId,
    "category"
);
entity_id!(
    /// Identifier of a catalog service
    ServiceId,
    "service"
);
entity_id!(
    /// Identifier of a consultant profile (not the consultant's user account)
    ConsultantId,
    "consultant"
);
entity_id!(
    /// Identifier of a user account owned by the surrounding application
    UserId,
    "user"
);
entity_id!(RequestId, "request");
entity_id!(OrderId, "order");
entity_id!(OrderItemId, "order_item");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        assert_eq!(ConsultantId(3).to_string(), "consultant_3");
        assert_eq!(OrderItemId(12).to_string(), "order_item_12");
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ServiceId(38)).unwrap();
        assert_eq!(json, "38");
        let back: ServiceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServiceId(38));
    }
}
