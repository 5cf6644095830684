use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::permissions::AccessLevel;

// Enumerations stored as TEXT columns.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    FellowshipLeader,
    BacentaLeader,
}

impl Default for MemberRole {
    fn default() -> Self {
        Self::Member
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Contacted,
    Integrated,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Revoked,
    Expired,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccessKind {
    RoleChange,
    AccessLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DeletionRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    InviteReceived,
    InviteAccepted,
    InviteRejected,
    InviteCancelled,
    AccessRemoved,
    DeletionRequested,
    DeletionReviewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceSubject {
    Member,
    NewBeliever,
}

// Users and churches

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChurchRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = String, example = "admin")]
    pub role: flock_auth::UserRole,
    pub church: Option<ChurchRef>,
    pub invited_by: Option<UserSummary>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserSearchQuery {
    /// Case-insensitive email prefix.
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Church {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub access: AccessLevel,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessibleChurch {
    pub id: String,
    pub name: String,
    pub access: AccessLevel,
    pub is_own: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChurchesResponse {
    pub churches: Vec<AccessibleChurch>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChurchResponse {
    pub church: Church,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateChurchRequest {
    pub name: String,
}

// Bacentas

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Bacenta {
    #[serde(rename = "id")]
    pub public_id: String,
    pub name: String,
    pub member_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BacentaRequest {
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BacentasResponse {
    pub bacentas: Vec<Bacenta>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BacentaResponse {
    pub bacenta: Bacenta,
}

// Members

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Member {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub building_address: Option<String>,
    pub birthday: Option<String>,
    pub born_again: bool,
    pub role: MemberRole,
    /// Primary bacenta; drives church-level attendance membership.
    pub bacenta_id: Option<String>,
    /// Secondary, display-only associations.
    pub linked_bacenta_ids: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateMemberRequest {
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub building_address: Option<String>,
    pub birthday: Option<String>,
    pub born_again: Option<bool>,
    pub role: Option<MemberRole>,
    pub bacenta_id: Option<String>,
    pub linked_bacenta_ids: Option<Vec<String>>,
}

/// Partial update. Omitted fields are unchanged; a blank string clears an
/// optional text field, and a blank `bacenta_id` clears the primary bacenta.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateMemberRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub building_address: Option<String>,
    pub birthday: Option<String>,
    pub born_again: Option<bool>,
    pub role: Option<MemberRole>,
    pub bacenta_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkedBacentasRequest {
    pub bacenta_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberActiveRequest {
    pub active: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MemberFilter {
    pub bacenta_id: Option<String>,
    pub role: Option<MemberRole>,
    pub active: Option<bool>,
    /// Matches first name, last name or phone.
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersResponse {
    pub members: Vec<Member>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub member: Member,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportMembersRequest {
    pub text: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportMembersResponse {
    pub rows: Vec<crate::import::ParsedMember>,
    pub issues: Vec<crate::import::ParseIssue>,
    pub created: usize,
    pub skipped: usize,
}

// Deletion requests

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct DeletionRequest {
    #[serde(rename = "id")]
    pub public_id: String,
    #[serde(rename = "member_id")]
    pub member_public_id: Option<String>,
    pub member_name: String,
    #[serde(rename = "requested_by")]
    pub requested_by_public_id: String,
    pub requested_by_name: Option<String>,
    pub reason: Option<String>,
    pub status: DeletionRequestStatus,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDeletionRequest {
    pub member_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletionRequestsResponse {
    pub requests: Vec<DeletionRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletionRequestResponse {
    pub request: DeletionRequest,
}

// New believers

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct NewBeliever {
    #[serde(rename = "id")]
    pub public_id: String,
    pub name: String,
    pub surname: Option<String>,
    pub contact: Option<String>,
    pub date_of_visit: String,
    pub residence: Option<String>,
    pub studies: Option<String>,
    pub campus: Option<String>,
    pub occupation: Option<String>,
    pub year: Option<String>,
    pub is_first_time: bool,
    pub ministry: Option<String>,
    pub follow_up_status: FollowUpStatus,
    pub follow_up_notes: Option<String>,
    #[serde(rename = "converted_member_id")]
    pub converted_member_public_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewBelieverRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub contact: Option<String>,
    pub date_of_visit: Option<String>,
    pub residence: Option<String>,
    pub studies: Option<String>,
    pub campus: Option<String>,
    pub occupation: Option<String>,
    pub year: Option<String>,
    pub is_first_time: Option<bool>,
    pub ministry: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FollowUpRequest {
    pub status: FollowUpStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConvertRequest {
    pub bacenta_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NewBelieverFilter {
    pub follow_up_status: Option<FollowUpStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewBelieversResponse {
    pub new_believers: Vec<NewBeliever>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewBelieverResponse {
    pub new_believer: NewBeliever,
}

// Attendance and head counts

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceRecord {
    pub subject: AttendanceSubject,
    pub subject_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkAttendanceRequest {
    pub date: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub date: String,
    pub bacenta_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DateQuery {
    pub date: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceResponse {
    pub date: String,
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceRecordResponse {
    pub record: AttendanceRecord,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct HeadCount {
    #[serde(rename = "bacenta_id")]
    pub bacenta_public_id: String,
    pub bacenta_name: String,
    pub date: String,
    pub count: i64,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetHeadCountRequest {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HeadCountsResponse {
    pub date: String,
    pub total: i64,
    pub head_counts: Vec<HeadCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HeadCountResponse {
    pub head_count: HeadCount,
}

// Guests

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Guest {
    #[serde(rename = "id")]
    pub public_id: String,
    #[serde(rename = "bacenta_id")]
    pub bacenta_public_id: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date: String,
    #[serde(rename = "converted_member_id")]
    pub converted_member_public_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGuestRequest {
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date: String,
    pub bacenta_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct GuestFilter {
    pub date: Option<String>,
    pub bacenta_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GuestsResponse {
    pub guests: Vec<Guest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GuestResponse {
    pub guest: Guest,
}

// Invites

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminInvite {
    pub id: String,
    pub church_id: String,
    pub church_name: String,
    pub inviter: UserSummary,
    pub invitee: UserSummary,
    pub status: InviteStatus,
    pub access_kind: Option<AccessKind>,
    pub created_at: String,
    pub expires_at: String,
    pub responded_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendInviteRequest {
    /// Public id of the user being invited.
    pub invitee_id: String,
    /// Overrides the configured lifetime; 1 to 720 hours.
    pub expires_in_hours: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitesResponse {
    pub invites: Vec<AdminInvite>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    pub invite: AdminInvite,
}

// Chat

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatThread {
    pub id: String,
    pub church_id: String,
    pub title: String,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<ChatMessage>,
    pub unread_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub title: String,
    /// Public ids of users in the caller's church; the caller is always added.
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Return messages older than this message id.
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadsResponse {
    pub threads: Vec<ChatThread>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadResponse {
    pub thread: ChatThread,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: ChatMessage,
}

// Notifications

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    #[serde(rename = "id")]
    pub public_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    /// Deep-link target such as an invite or thread id.
    pub link: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationsQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkNotificationReadRequest {
    pub read: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub notification: Notification,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkUpdateResponse {
    pub updated: u64,
}

// Analytics

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BacentaBreakdown {
    pub bacenta_id: Option<String>,
    pub bacenta_name: String,
    pub total: i64,
    pub present: i64,
    pub absent: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeeklySummary {
    pub date: String,
    pub label: String,
    pub total_members: i64,
    pub present: i64,
    pub absent: i64,
    pub unmarked: i64,
    pub attendance_rate: f64,
    pub new_believers_present: i64,
    pub guests: i64,
    pub head_count_total: i64,
    pub bacentas: Vec<BacentaBreakdown>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendPoint {
    pub date: String,
    pub present: i64,
    pub total: i64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthlyTrend {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct HistoryEntry {
    pub date: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberHistory {
    pub member_id: String,
    pub from: String,
    pub to: String,
    pub present: i64,
    pub absent: i64,
    pub records: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WeeklyQuery {
    /// Any day; the summary covers the Sunday on or before it. Defaults to today.
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MonthlyQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub from: String,
    pub to: String,
}
