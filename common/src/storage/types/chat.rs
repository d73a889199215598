#![allow(clippy::module_name_repetitions)]
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub use message::{ChatMessage, ChatRole};

stored_object!(ChatSession, "chat_session", {
    tenant_id: String,
    user_id: String,
    graph_id: String,
    branch_id: String,
    title: String,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    ended_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>
});

impl ChatSession {
    pub fn new(
        tenant_id: String,
        user_id: String,
        graph_id: String,
        branch_id: String,
        title: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            user_id,
            graph_id,
            branch_id,
            title,
            ended_at: None,
            metadata: None,
        }
    }

    /// Session plus ordered history, with an ownership check so one user
    /// cannot read another's transcript.
    pub async fn get_complete(
        session_id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(Self, Vec<ChatMessage>), AppError> {
        let session: Self = db
            .get_item(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Chat session not found".to_string()))?;

        if session.user_id != user_id {
            return Err(AppError::Auth(
                "You don't have access to this session".to_string(),
            ));
        }

        let messages: Vec<ChatMessage> = db
            .client
            .query(
                "SELECT * FROM chat_message WHERE session_id = $session_id \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(("session_id", session_id.to_string()))
            .await?
            .take(0)?;

        Ok((session, messages))
    }

    pub async fn end(session_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update((Self::table_name(), session_id))
            .patch(PatchOp::replace(
                "/ended_at",
                surrealdb::sql::Datetime::default(),
            ))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;
        Ok(())
    }
}

pub mod message {
    use crate::stored_object;
    use uuid::Uuid;

    #[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
    pub enum ChatRole {
        User,
        AI,
        System,
        Tool,
    }

    stored_object!(ChatMessage, "chat_message", {
        session_id: String,
        role: ChatRole,
        content: String,
        references: Option<Vec<String>>
    });

    impl ChatMessage {
        pub fn new(
            session_id: String,
            role: ChatRole,
            content: String,
            references: Option<Vec<String>>,
        ) -> Self {
            let now = Utc::now();
            Self {
                id: Uuid::new_v4().to_string(),
                created_at: now,
                updated_at: now,
                session_id,
                role,
                content,
                references,
            }
        }
    }
}
