//! Student (borrower) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Student record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Student {
    pub id: i32,
    pub name: String,
    /// Roll number, unique
    pub roll_number: String,
    pub department: String,
    pub semester: i32,
    /// Phone number, unique
    pub phone: String,
    /// Email address, unique; reminders are sent here
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Whether the student passes the filters of a list query
    pub fn matches(&self, query: &StudentQuery) -> bool {
        let department = query
            .department
            .as_deref()
            .map(|d| self.department == d)
            .unwrap_or(true);
        let semester = query.semester.map(|s| self.semester == s).unwrap_or(true);
        let search = query
            .search
            .as_deref()
            .map(|s| {
                let s = s.to_lowercase();
                self.name.to_lowercase().contains(&s)
                    || self.roll_number.to_lowercase().contains(&s)
                    || self.phone.contains(&s)
            })
            .unwrap_or(true);

        department && semester && search
    }
}

/// Create student request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateStudent {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Roll number is required"))]
    pub roll_number: String,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[validate(range(min = 1, message = "Semester must be at least 1"))]
    pub semester: i32,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Update student request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStudent {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Roll number cannot be empty"))]
    pub roll_number: Option<String>,
    #[validate(length(min = 1, message = "Department cannot be empty"))]
    pub department: Option<String>,
    #[validate(range(min = 1, message = "Semester must be at least 1"))]
    pub semester: Option<i32>,
    #[validate(length(min = 1, message = "Phone cannot be empty"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

/// Student query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct StudentQuery {
    pub department: Option<String>,
    pub semester: Option<i32>,
    /// Case-insensitive match on name, roll number or phone
    pub search: Option<String>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Students per page (default: 10)
    pub limit: Option<i64>,
}
