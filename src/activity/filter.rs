//! Feed filters and page requests

use crate::error::{AppError, AppResult};
use crate::types::{Origin, DOWNLOAD_OPERATION, GENERATION_OPERATION};
use crate::utils::time::DateWindow;

/// Conjunctive filters for the merged feed
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub window: DateWindow,
    pub user_id: Option<i64>,
    /// Resolved by join against `users`
    pub username: Option<String>,
    /// Exact match; also decides which origins take part
    pub operation_type: Option<String>,
}

impl LogFilter {
    /// Filter that only constrains the date window
    pub fn within(window: DateWindow) -> Self {
        Self {
            window,
            user_id: None,
            username: None,
            operation_type: None,
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    pub(crate) fn username(&self) -> Option<&str> {
        self.username.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub(crate) fn operation_type(&self) -> Option<&str> {
        self.operation_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Origins that contribute rows under this filter.
    ///
    /// `download` selects only simple downloads, `script_generation` only
    /// generation events, any other type only generic operations.
    pub fn origins(&self) -> &'static [Origin] {
        match self.operation_type() {
            None => &[Origin::Operation, Origin::Generation, Origin::Download],
            Some(DOWNLOAD_OPERATION) => &[Origin::Download],
            Some(GENERATION_OPERATION) => &[Origin::Generation],
            Some(_) => &[Origin::Operation],
        }
    }
}

/// Validated 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> AppResult<Self> {
        if page < 1 {
            return Err(AppError::invalid(format!("page must be >= 1, got {}", page)));
        }
        if page_size < 1 {
            return Err(AppError::invalid(format!(
                "page_size must be >= 1, got {}",
                page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn filter() -> LogFilter {
        LogFilter::within(DateWindow::all_time(Utc::now()))
    }

    #[test]
    fn test_page_request_validation() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(-3, 10).is_err());

        let page = PageRequest::new(3, 20).unwrap();
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn test_operation_type_selects_origins() {
        assert_eq!(filter().origins().len(), 3);
        assert_eq!(
            filter().with_operation_type("download").origins(),
            &[Origin::Download]
        );
        assert_eq!(
            filter().with_operation_type("script_generation").origins(),
            &[Origin::Generation]
        );
        assert_eq!(
            filter().with_operation_type("login").origins(),
            &[Origin::Operation]
        );
        assert_eq!(filter().with_operation_type("  ").origins().len(), 3);
    }
}
