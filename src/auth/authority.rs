use std::collections::BTreeSet;

pub const ROLE_USER: &str = "user";
pub const ROLE_CONSULTANT: &str = "consultant";
pub const ROLE_MAIN_CONSULTANT: &str = "main-consultant";
pub const ROLE_GROUP_CHAT_CONSULTANT: &str = "group-chat-consultant";
pub const ROLE_USER_ADMIN: &str = "user-admin";

/// Fine grained permissions derived from identity provider realm roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Authority {
    UserDefault,
    ConsultantDefault,
    AssignConsultantToSession,
    AssignConsultantToEnquiry,
    CreateNewChat,
    StartChat,
    StopChat,
    UpdateChat,
    UserAdmin,
}

impl Authority {
    pub fn as_str(self) -> &'static str {
        match self {
            Authority::UserDefault => "AUTHORIZATION_USER_DEFAULT",
            Authority::ConsultantDefault => "AUTHORIZATION_CONSULTANT_DEFAULT",
            Authority::AssignConsultantToSession => "AUTHORIZATION_ASSIGN_CONSULTANT_TO_SESSION",
            Authority::AssignConsultantToEnquiry => "AUTHORIZATION_ASSIGN_CONSULTANT_TO_ENQUIRY",
            Authority::CreateNewChat => "AUTHORIZATION_CREATE_NEW_CHAT",
            Authority::StartChat => "AUTHORIZATION_START_CHAT",
            Authority::StopChat => "AUTHORIZATION_STOP_CHAT",
            Authority::UpdateChat => "AUTHORIZATION_UPDATE_CHAT",
            Authority::UserAdmin => "AUTHORIZATION_USER_ADMIN",
        }
    }
}

fn authorities_for_role(role: &str) -> &'static [Authority] {
    match role {
        ROLE_USER => &[Authority::UserDefault, Authority::AssignConsultantToSession],
        ROLE_CONSULTANT => &[
            Authority::ConsultantDefault,
            Authority::AssignConsultantToSession,
        ],
        ROLE_MAIN_CONSULTANT => &[Authority::AssignConsultantToEnquiry],
        ROLE_GROUP_CHAT_CONSULTANT => &[
            Authority::ConsultantDefault,
            Authority::CreateNewChat,
            Authority::StartChat,
            Authority::StopChat,
            Authority::UpdateChat,
        ],
        ROLE_USER_ADMIN => &[Authority::UserAdmin],
        _ => &[],
    }
}

/// Unknown roles grant nothing.
pub fn authorities_for_roles<'a>(roles: impl IntoIterator<Item = &'a str>) -> BTreeSet<Authority> {
    roles
        .into_iter()
        .flat_map(|role| authorities_for_role(role).iter().copied())
        .collect()
}
