/// Creates an [`AuditError`](crate::error::AuditError) with the given kind,
/// description, and optional detail.
///
/// The detail arm accepts anything implementing `Display` and formats it
/// lazily at the callsite.
#[macro_export]
macro_rules! audit_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::AuditError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::AuditError::from(($kind, $desc, format!("{}", $detail)))
    };
}

/// Returns early from the enclosing function with an
/// [`AuditError`](crate::error::AuditError) built via [`audit_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::audit_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::audit_error!($kind, $desc, $detail))
    };
}
