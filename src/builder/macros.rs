//! Macros for declaring typed machine states.

/// Declare an enum and implement [`MachineState`](crate::typed::MachineState)
/// for it.
///
/// The `unset:` variant is what a [`TypedMachine`](crate::typed::TypedMachine)
/// reports before it has been assembled; it is never registered as a state.
///
/// # Example
///
/// ```
/// use turnstile::state_enum;
/// use turnstile::typed::MachineState;
///
/// state_enum! {
///     pub enum Door {
///         Unknown,
///         Closed,
///         Open,
///     }
///     unset: Unknown
/// }
///
/// assert_eq!(Door::Open.name(), "Open");
/// assert_eq!(Door::unset(), Door::Unknown);
/// assert_eq!(Door::from_name("Closed"), Some(Door::Closed));
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }

        unset: $unset:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::typed::MachineState for $name {
            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }

            fn all() -> &'static [Self] {
                &[$(Self::$variant),*]
            }

            fn unset() -> Self {
                Self::$unset
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::typed::MachineState;

    state_enum! {
        enum TestState {
            Unset,
            Initial,
            Processing,
            Complete,
        }
        unset: Unset
    }

    #[test]
    fn state_enum_macro_generates_trait() {
        assert_eq!(TestState::Initial.name(), "Initial");
        assert_eq!(TestState::unset(), TestState::Unset);
        assert_eq!(TestState::all().len(), 4);
    }

    #[test]
    fn state_enum_lists_declared_states_without_unset() {
        let names: Vec<_> = TestState::declared().into_iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Initial", "Processing", "Complete"]);
    }

    #[test]
    fn state_enum_supports_visibility() {
        state_enum! {
            pub enum PublicState {
                None,
                A,
                B,
            }
            unset: None
        }

        assert_eq!(PublicState::from_name("B"), Some(PublicState::B));
        assert_eq!(PublicState::from_name("C"), None);
    }

    #[test]
    fn state_enum_serializes_by_variant_name() {
        let json = serde_json::to_string(&TestState::Processing).unwrap();
        assert_eq!(json, "\"Processing\"");
    }
}
