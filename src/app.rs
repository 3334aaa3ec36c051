// Version is of the format 0.YY.MM[.i], or 0.year.month.optional_minor_increment,
// similar to Ubuntu's versioning scheme: an immediate reference for when the
// app was last updated. Major version is kept at 0 since the app is
// perpetually in 'beta' absent a tax lawyer on staff.
pub const LEDGER_APP_VERSION: &str = "0.26.07.rust";
