use crate::api::employee::{CreateEmployee, EmployeeReportRow};
use crate::api::office::{CreateOffice, OfficeDetail};
use crate::api::payment::{
    CopyMonthReq, CreatePayment, EntryInput, PaymentDetail, PaymentReport, PaymentReportRow,
    UpdatePayment,
};
use crate::api::promotion::{CreatePromotion, PromotionRow};
use crate::api::report::{RetireReport, RetireRow, TaxReport, TaxRow};
use crate::api::subscription::{
    ExtendOfficeReq, ExtendSubscriptionReq, ExtensionResponse, SubscribeReq, SubscriptionSummary,
};
use crate::api::user::UserProfile;
use crate::auth::handlers::LoginResponse;
use crate::model::employee::Employee;
use crate::model::office::{Office, OfficeActivation};
use crate::model::payment::Payment;
use crate::model::payment_entry::{EntryType, PaymentEntry};
use crate::model::promotion::Promotion;
use crate::model::role::Role;
use crate::model::user::User;
use crate::models::{LoginReqDto, RegisterReq};
use crate::payroll::{BreakdownTotals, PayComponents, SalaryBreakdown};
use crate::subscription::{PlanInfo, SubscriptionPlan, SubscriptionStatus};
use crate::utils::db_utils::{EmployeePage, OfficePage, PromotionPage, UserPage};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Office Payroll API",
        version = "1.0.0",
        description = r#"
## Office Payroll & HR System

This API powers payroll and HR management for government offices: employee
records, monthly salaries, promotions, subscriptions and report data.

### 🔹 Key Features
- **Offices**
  - Office hierarchy and subscription management
- **Employees**
  - Create, update, list, and view employee records
- **Payments**
  - Monthly payroll with credit/debit entries and net salary breakdown
  - Copy a whole month forward, payroll history with totals
- **Promotions**
  - Grade, level and salary promotions with due dates
- **Reports**
  - Tax deductions and retirement contributions per office and month

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
Writes require an **Admin**, **Office admin** or **Accountant** account;
office and user administration require **Admin**.

### 📦 Response Format
- JSON-based RESTful responses
- Errors are `{"error": "<kind>", "message": "..."}`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::me,
        crate::api::user::list_users,
        crate::api::user::update_user,
        crate::api::user::delete_user,

        crate::api::office::create_office,
        crate::api::office::list_offices,
        crate::api::office::get_office,
        crate::api::office::list_children,
        crate::api::office::update_office,
        crate::api::office::delete_office,

        crate::api::subscription::extend_office,
        crate::api::subscription::extend_subscription,
        crate::api::subscription::subscribe,
        crate::api::subscription::subscription_status,
        crate::api::subscription::list_activations,
        crate::api::subscription::list_plans,

        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::employee_report,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::payment::create_payment,
        crate::api::payment::get_payment,
        crate::api::payment::lookup_payment,
        crate::api::payment::update_payment,
        crate::api::payment::delete_payment,
        crate::api::payment::list_payments,
        crate::api::payment::payment_history,
        crate::api::payment::copy_next_month,

        crate::api::promotion::create_promotion,
        crate::api::promotion::list_promotions,
        crate::api::promotion::get_promotion,
        crate::api::promotion::update_promotion,
        crate::api::promotion::delete_promotion,

        crate::api::report::tax_report,
        crate::api::report::retire_report
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            Role,
            User,
            UserProfile,
            UserPage,
            Office,
            OfficeDetail,
            OfficeActivation,
            OfficePage,
            CreateOffice,
            SubscriptionPlan,
            SubscriptionStatus,
            PlanInfo,
            ExtendOfficeReq,
            ExtendSubscriptionReq,
            ExtensionResponse,
            SubscribeReq,
            SubscriptionSummary,
            Employee,
            EmployeePage,
            CreateEmployee,
            EmployeeReportRow,
            Payment,
            PaymentEntry,
            EntryType,
            EntryInput,
            PayComponents,
            SalaryBreakdown,
            BreakdownTotals,
            CreatePayment,
            UpdatePayment,
            PaymentDetail,
            PaymentReport,
            PaymentReportRow,
            CopyMonthReq,
            Promotion,
            PromotionRow,
            PromotionPage,
            CreatePromotion,
            TaxRow,
            TaxReport,
            RetireRow,
            RetireReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-up, sign-in and token APIs"),
        (name = "User", description = "Account APIs"),
        (name = "Office", description = "Office hierarchy APIs"),
        (name = "Subscription", description = "Office subscription APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Payment", description = "Monthly payroll APIs"),
        (name = "Promotion", description = "Promotion APIs"),
        (name = "Report", description = "Tax and retirement reports"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
