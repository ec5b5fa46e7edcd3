use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Society Manager API",
        version = "0.1.0",
        description = "Backend API for multi-tenant residential society management"
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    tags(
        (name = "auth", description = "Login, tokens, profiles and user administration"),
        (name = "society", description = "Societies, blocks and flats"),
        (name = "billing", description = "Maintenance bills and payments"),
        (name = "notices", description = "Society notice board"),
        (name = "visitors", description = "Gate visitor log"),
        (name = "complaints", description = "Resident complaints"),
        (name = "events", description = "Society events and RSVPs"),
        (name = "alerts", description = "Emergency alerts"),
        (name = "contact", description = "Public contact form")
    ),
    paths(
        // Auth
        crate::api::auth::login,
        crate::api::auth::refresh_token,
        crate::api::auth::logout,
        crate::api::auth::register,
        crate::api::auth::get_profile,
        crate::api::auth::update_profile,
        crate::api::auth::change_password,
        crate::api::auth::list_users,
        crate::api::auth::update_user,
        // Society
        crate::api::society::list_societies,
        crate::api::society::get_society,
        crate::api::society::create_society,
        crate::api::society::update_society,
        crate::api::society::delete_society,
        crate::api::society::list_blocks,
        crate::api::society::get_block,
        crate::api::society::create_block,
        crate::api::society::create_block_with_flats,
        crate::api::society::update_block,
        crate::api::society::delete_block,
        crate::api::society::regenerate_flats,
        crate::api::society::list_flats,
        crate::api::society::get_flat,
        crate::api::society::create_flat,
        crate::api::society::update_flat,
        crate::api::society::delete_flat,
        crate::api::society::my_society_flats,
        crate::api::society::directory,
        crate::api::society::dashboard,
        // Billing
        crate::api::billing::list_bills,
        crate::api::billing::my_bills,
        crate::api::billing::get_bill,
        crate::api::billing::create_bill,
        crate::api::billing::update_bill,
        crate::api::billing::delete_bill,
        crate::api::billing::record_payment,
        crate::api::billing::mark_paid,
        crate::api::billing::bill_stats,
        crate::api::billing::list_payments,
        crate::api::billing::get_payment,
        // Notices
        crate::api::notices::list_notices,
        crate::api::notices::get_notice,
        crate::api::notices::create_notice,
        crate::api::notices::update_notice,
        crate::api::notices::delete_notice,
        crate::api::notices::upload_attachment,
        // Visitors
        crate::api::visitors::list_visitors,
        crate::api::visitors::active_visitors,
        crate::api::visitors::pending_visitors,
        crate::api::visitors::get_visitor,
        crate::api::visitors::create_visitor,
        crate::api::visitors::update_visitor,
        crate::api::visitors::delete_visitor,
        crate::api::visitors::approve,
        crate::api::visitors::reject,
        crate::api::visitors::check_in,
        crate::api::visitors::check_out,
        crate::api::visitors::upload_photo,
        // Complaints
        crate::api::complaints::list_complaints,
        crate::api::complaints::get_complaint,
        crate::api::complaints::create_complaint,
        crate::api::complaints::update_complaint,
        crate::api::complaints::delete_complaint,
        crate::api::complaints::add_update,
        crate::api::complaints::assign,
        crate::api::complaints::resolve,
        crate::api::complaints::close,
        crate::api::complaints::reject,
        crate::api::complaints::upload_photo,
        crate::api::complaints::complaint_stats,
        // Events
        crate::api::events::list_events,
        crate::api::events::upcoming_events,
        crate::api::events::get_event,
        crate::api::events::create_event,
        crate::api::events::update_event,
        crate::api::events::delete_event,
        crate::api::events::rsvp,
        // Alerts
        crate::api::alerts::list_alerts,
        crate::api::alerts::active_alerts,
        crate::api::alerts::unacknowledged_count,
        crate::api::alerts::get_alert,
        crate::api::alerts::create_alert,
        crate::api::alerts::update_alert,
        crate::api::alerts::delete_alert,
        crate::api::alerts::acknowledge,
        // Contact
        crate::api::contact::submit,
        crate::api::contact::list_submissions,
        crate::api::contact::mark_read,
    ),
    components(
        schemas(
            // Society
            crate::models::Society,
            crate::models::CreateSocietyRequest,
            crate::models::UpdateSocietyRequest,
            crate::models::Block,
            crate::models::BlockResponse,
            crate::models::CreateBlockRequest,
            crate::models::UpdateBlockRequest,
            crate::models::CreateBlockWithFlatsRequest,
            crate::models::RegenerateFlatsResponse,
            crate::models::OccupancyStatus,
            crate::models::Flat,
            crate::models::FlatResponse,
            crate::models::FlatDetailResponse,
            crate::models::CreateFlatRequest,
            crate::models::UpdateFlatRequest,
            crate::models::DashboardResponse,
            crate::models::DashboardBlock,
            crate::models::DashboardFloor,
            crate::models::DashboardFlat,
            // Users
            crate::models::UserRole,
            crate::models::UserResponse,
            crate::models::UserSummary,
            crate::models::LoginRequest,
            crate::models::LoginResponse,
            crate::models::RefreshTokenRequest,
            crate::models::TokenResponse,
            crate::models::RegisterRequest,
            crate::models::UpdateProfileRequest,
            crate::models::AdminUpdateUserRequest,
            crate::models::ChangePasswordRequest,
            // Billing
            crate::models::BillStatus,
            crate::models::Bill,
            crate::models::BillResponse,
            crate::models::BillDetailResponse,
            crate::models::CreateBillRequest,
            crate::models::UpdateBillRequest,
            crate::models::BillStatsResponse,
            crate::models::PaymentMethod,
            crate::models::PaymentStatus,
            crate::models::Payment,
            crate::models::PaymentResponse,
            crate::models::RecordPaymentRequest,
            crate::models::MarkPaidRequest,
            // Complaints
            crate::models::ComplaintCategory,
            crate::models::Priority,
            crate::models::ComplaintStatus,
            crate::models::Complaint,
            crate::models::ComplaintResponse,
            crate::models::ComplaintDetailResponse,
            crate::models::ComplaintUpdateResponse,
            crate::models::CreateComplaintRequest,
            crate::models::UpdateComplaintRequest,
            crate::models::AddComplaintUpdateRequest,
            crate::models::AssignComplaintRequest,
            crate::models::ResolveComplaintRequest,
            crate::models::RejectComplaintRequest,
            crate::models::ComplaintStatsResponse,
            // Visitors
            crate::models::VisitorPurpose,
            crate::models::VisitorStatus,
            crate::models::Visitor,
            crate::models::VisitorResponse,
            crate::models::CreateVisitorRequest,
            crate::models::UpdateVisitorRequest,
            crate::models::CheckInRequest,
            crate::models::CheckOutRequest,
            // Notices
            crate::models::NoticeCategory,
            crate::models::Notice,
            crate::models::NoticeResponse,
            crate::models::CreateNoticeRequest,
            crate::models::UpdateNoticeRequest,
            // Events
            crate::models::EventType,
            crate::models::Event,
            crate::models::EventResponse,
            crate::models::EventDetailResponse,
            crate::models::CreateEventRequest,
            crate::models::UpdateEventRequest,
            crate::models::RsvpResponse,
            // Alerts
            crate::models::AlertType,
            crate::models::AlertSeverity,
            crate::models::EmergencyAlert,
            crate::models::AlertResponse,
            crate::models::CreateAlertRequest,
            crate::models::UpdateAlertRequest,
            crate::models::AcknowledgeResponse,
            crate::models::UnacknowledgedCountResponse,
            // Contact
            crate::models::ContactSubmission,
            crate::models::ContactRequest,
            crate::models::ContactResponse,
            crate::api::auth::MessageResponse,
            // Pages
            crate::utils::pagination::SocietyPage,
            crate::utils::pagination::BlockPage,
            crate::utils::pagination::FlatPage,
            crate::utils::pagination::UserPage,
            crate::utils::pagination::NoticePage,
            crate::utils::pagination::VisitorPage,
            crate::utils::pagination::ComplaintPage,
            crate::utils::pagination::BillPage,
            crate::utils::pagination::PaymentPage,
            crate::utils::pagination::EventPage,
            crate::utils::pagination::AlertPage,
            crate::utils::pagination::ContactPage,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
