//! TruckTech Authentication Layer
//!
//! Signs in to the fleet portal and hands back an authenticated page.
//!
//! # Login Flow
//!
//! 1. **Session probe**: restore the saved cookies and open the dashboard;
//!    reuse the session unless the portal bounces us to the login page
//! 2. **Fresh login**: fill the sign-in form in a clean context
//! 3. **MFA**: detect a second-factor challenge and answer it with a
//!    [`MfaCodeProvider`], wait for a human in a headed browser, or give up
//!    with [`AuthError::MfaRequired`]
//! 4. **Classification**: dashboard URL, error banner, still on the login
//!    page, or an unknown page accepted tentatively
//!
//! Every successful fresh login persists the session through a
//! [`SessionStore`](trucktech_browser::SessionStore) so the next run can skip it.

pub mod authenticator;
pub mod error;
pub mod mfa;

pub use authenticator::{AuthState, Authenticator, LoginOutcome, PortalSession};
pub use error::{AuthError, Result};
pub use mfa::{
    detect_mfa, MfaCodeProvider, MfaIndicator, MfaKind, StaticCodeProvider, TotpProvider,
    MFA_DETECTORS,
};
