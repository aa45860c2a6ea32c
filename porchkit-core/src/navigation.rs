//! Navigation capability seam.

/// Routing capability the host app provides to the session core.
///
/// Implementations move the user to named screens; the core never knows
/// about concrete routes or the navigation stack.
pub trait Navigator: Send + Sync {
    /// Redirects to the application's root/entry screen. The session
    /// manager invokes this on sign-out.
    fn redirect_to_root(&self);

    /// Redirects to the signed-in home screen. Screens invoke this after
    /// a successful sign-in or sign-up.
    fn redirect_to_home(&self);
}
