#![allow(dead_code)]

use std::net::SocketAddr;

use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;
use whisperline::{
    auth::{Directory, Role, UserProfile},
    db, router, AppState,
};

pub struct World {
    pub db_pool: SqlitePool,
    pub state: AppState,
    pub directory: Directory,
}

pub struct User {
    pub id: Uuid,
    pub token: String,
}

pub async fn world() -> World {
    let db_pool = db::in_memory().await.unwrap();
    World {
        directory: Directory::new(db_pool.clone()),
        state: AppState::new(db_pool.clone()),
        db_pool,
    }
}

impl World {
    pub async fn user(&self, first_name: &str) -> User {
        let id = Uuid::now_v7();
        let token = format!("tok-{first_name}-{id}");
        let profile = UserProfile {
            id,
            first_name: first_name.to_owned(),
            last_name: "Tester".to_owned(),
            email: format!("{}@example.com", first_name.to_lowercase()),
            image_url: None,
        };
        self.directory.register(&profile, &token, Role::User).await.unwrap();
        User { id, token }
    }

    /// Serves the app on an ephemeral port and returns its address.
    pub async fn serve(&self) -> SocketAddr {
        let app = router(self.state.clone(), CorsLayer::permissive());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}
