use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::google_login,
        crate::routes::auth::google_callback,
        crate::routes::users::get_current_user,
        crate::routes::users::update_current_user,
        crate::routes::users::search_users,
        crate::routes::churches::list_churches,
        crate::routes::churches::get_church,
        crate::routes::churches::update_church,
        crate::routes::bacentas::list_bacentas,
        crate::routes::bacentas::create_bacenta,
        crate::routes::bacentas::get_bacenta,
        crate::routes::bacentas::rename_bacenta,
        crate::routes::bacentas::delete_bacenta,
        crate::routes::members::list_members,
        crate::routes::members::create_member,
        crate::routes::members::get_member,
        crate::routes::members::update_member,
        crate::routes::members::delete_member,
        crate::routes::members::set_linked_bacentas,
        crate::routes::members::set_member_active,
        crate::routes::members::import_members,
        crate::routes::deletion_requests::list_requests,
        crate::routes::deletion_requests::create_request,
        crate::routes::deletion_requests::approve_request,
        crate::routes::deletion_requests::reject_request,
        crate::routes::new_believers::list_new_believers,
        crate::routes::new_believers::create_new_believer,
        crate::routes::new_believers::get_new_believer,
        crate::routes::new_believers::update_new_believer,
        crate::routes::new_believers::delete_new_believer,
        crate::routes::new_believers::set_follow_up,
        crate::routes::new_believers::convert_new_believer,
        crate::routes::attendance::list_attendance,
        crate::routes::attendance::mark_member,
        crate::routes::attendance::mark_new_believer,
        crate::routes::attendance::clear_member,
        crate::routes::attendance::clear_new_believer,
        crate::routes::head_counts::list_head_counts,
        crate::routes::head_counts::set_head_count,
        crate::routes::guests::list_guests,
        crate::routes::guests::create_guest,
        crate::routes::guests::delete_guest,
        crate::routes::guests::convert_guest,
        crate::routes::analytics::weekly_summary,
        crate::routes::analytics::monthly_trend,
        crate::routes::analytics::member_history,
        crate::routes::invites::send_invite,
        crate::routes::invites::list_incoming,
        crate::routes::invites::list_outgoing,
        crate::routes::invites::accept_invite,
        crate::routes::invites::reject_invite,
        crate::routes::invites::cancel_invite,
        crate::routes::invites::remove_access,
        crate::routes::chat::list_threads,
        crate::routes::chat::create_thread,
        crate::routes::chat::get_thread,
        crate::routes::chat::list_messages,
        crate::routes::chat::post_message,
        crate::routes::chat::mark_thread_read,
        crate::routes::notifications::get_notifications,
        crate::routes::notifications::get_unread_count,
        crate::routes::notifications::mark_notification_read,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::delete_notification,
        crate::routes::websocket::websocket_handler
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::permissions::AccessLevel,
            crate::import::ParsedMember,
            crate::import::ParseIssue,
            crate::routes::health::HealthResponse,
            crate::routes::auth::GoogleLoginResponse,
            crate::routes::auth::GoogleCallbackRequest,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::SessionResponse,
            crate::routes::auth::UserResponse,
            crate::routes::users::UserProfileResponse,
            crate::routes::new_believers::ConvertResponse,
            crate::routes::guests::GuestConversionResponse,
            crate::routes::models::MemberRole,
            crate::routes::models::AttendanceStatus,
            crate::routes::models::FollowUpStatus,
            crate::routes::models::InviteStatus,
            crate::routes::models::AccessKind,
            crate::routes::models::DeletionRequestStatus,
            crate::routes::models::NotificationKind,
            crate::routes::models::AttendanceSubject,
            crate::routes::models::UserSummary,
            crate::routes::models::ChurchRef,
            crate::routes::models::UserProfile,
            crate::routes::models::UpdateProfileRequest,
            crate::routes::models::UsersResponse,
            crate::routes::models::Church,
            crate::routes::models::AccessibleChurch,
            crate::routes::models::ChurchesResponse,
            crate::routes::models::ChurchResponse,
            crate::routes::models::UpdateChurchRequest,
            crate::routes::models::Bacenta,
            crate::routes::models::BacentaRequest,
            crate::routes::models::BacentasResponse,
            crate::routes::models::BacentaResponse,
            crate::routes::models::Member,
            crate::routes::models::CreateMemberRequest,
            crate::routes::models::UpdateMemberRequest,
            crate::routes::models::LinkedBacentasRequest,
            crate::routes::models::MemberActiveRequest,
            crate::routes::models::MembersResponse,
            crate::routes::models::MemberResponse,
            crate::routes::models::ImportMembersRequest,
            crate::routes::models::ImportMembersResponse,
            crate::routes::models::DeletionRequest,
            crate::routes::models::CreateDeletionRequest,
            crate::routes::models::DeletionRequestsResponse,
            crate::routes::models::DeletionRequestResponse,
            crate::routes::models::NewBeliever,
            crate::routes::models::NewBelieverRequest,
            crate::routes::models::FollowUpRequest,
            crate::routes::models::ConvertRequest,
            crate::routes::models::NewBelieversResponse,
            crate::routes::models::NewBelieverResponse,
            crate::routes::models::AttendanceRecord,
            crate::routes::models::MarkAttendanceRequest,
            crate::routes::models::AttendanceResponse,
            crate::routes::models::AttendanceRecordResponse,
            crate::routes::models::HeadCount,
            crate::routes::models::SetHeadCountRequest,
            crate::routes::models::HeadCountsResponse,
            crate::routes::models::HeadCountResponse,
            crate::routes::models::Guest,
            crate::routes::models::CreateGuestRequest,
            crate::routes::models::GuestsResponse,
            crate::routes::models::GuestResponse,
            crate::routes::models::AdminInvite,
            crate::routes::models::SendInviteRequest,
            crate::routes::models::InvitesResponse,
            crate::routes::models::InviteResponse,
            crate::routes::models::ChatMessage,
            crate::routes::models::ChatThread,
            crate::routes::models::CreateThreadRequest,
            crate::routes::models::PostMessageRequest,
            crate::routes::models::ThreadsResponse,
            crate::routes::models::ThreadResponse,
            crate::routes::models::MessagesResponse,
            crate::routes::models::MessageResponse,
            crate::routes::models::Notification,
            crate::routes::models::MarkNotificationReadRequest,
            crate::routes::models::NotificationsResponse,
            crate::routes::models::NotificationResponse,
            crate::routes::models::UnreadCountResponse,
            crate::routes::models::BulkUpdateResponse,
            crate::routes::models::BacentaBreakdown,
            crate::routes::models::WeeklySummary,
            crate::routes::models::TrendPoint,
            crate::routes::models::MonthlyTrend,
            crate::routes::models::HistoryEntry,
            crate::routes::models::MemberHistory
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Registration, login and Google sign-in"),
        (name = "Users", description = "Profile and user lookup"),
        (name = "Churches", description = "Churches the caller can reach"),
        (name = "Bacentas", description = "Small groups inside a church"),
        (name = "Members", description = "Member records and bulk import"),
        (name = "Deletion requests", description = "Leader requests to remove a member"),
        (name = "New believers", description = "First-time visitors and their follow-up"),
        (name = "Attendance", description = "Per-day attendance marks"),
        (name = "Head counts", description = "Per-bacenta head counts"),
        (name = "Guests", description = "Guests brought to a service"),
        (name = "Analytics", description = "Attendance summaries and trends"),
        (name = "Invites", description = "Admin invites and the access they grant"),
        (name = "Chat", description = "Threads between users of a church"),
        (name = "Notifications", description = "User notifications"),
        (name = "WebSocket", description = "Realtime updates stream")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_church_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/api/churches/{church_id}/members"));
        assert!(doc.paths.paths.contains_key("/api/invites/{invite_id}/accept"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
        assert!(components.schemas.contains_key("AdminInvite"));
    }
}
