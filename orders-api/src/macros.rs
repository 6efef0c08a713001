//! Helper macros for the orders API.

/// Implement `FromRef<AppState>` for a state field so handlers can extract it
/// directly.
///
/// ```ignore
/// impl_from_ref!(CachedOrderStore, orders);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for CachedOrderStore {
///     fn from_ref(state: &AppState) -> Self {
///         state.orders.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
