//! Result type alias for scanroute

use super::errors::RouteError;

/// Result type alias for scanroute operations
///
/// # Examples
///
/// ```
/// use scanroute::domain::result::Result;
/// use scanroute::domain::errors::RouteError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(RouteError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, RouteError>;
