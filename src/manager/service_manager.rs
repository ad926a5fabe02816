use super::Service;
use crate::error::{AppError, AppResult};

pub struct ServiceManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> ServiceManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

pub struct NewService<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub price: f64,
    pub image_url: Option<&'a str>,
    pub is_active: bool,
}

impl ServiceManager<'_> {
    pub async fn list_active(&self) -> AppResult<Vec<Service>> {
        Ok(sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE is_active = 1 ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn list_all(&self) -> AppResult<Vec<Service>> {
        Ok(
            sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY created_at DESC, id DESC")
                .fetch_all(self.pool)
                .await?,
        )
    }

    pub async fn create(&self, service: NewService<'_>) -> AppResult<i64> {
        let name = service.name.trim();
        let description = service.description.trim();
        if name.is_empty() || description.is_empty() {
            return Err(AppError::Validation(
                "Name and description are required".to_string(),
            ));
        }
        if !service.price.is_finite() || service.price < 0.0 {
            return Err(AppError::Validation(
                "Price must be a non-negative number".to_string(),
            ));
        }

        let id = sqlx::query(
            "INSERT INTO services (name, description, price, image_url, is_active) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(service.price)
        .bind(service.image_url.map(str::trim).filter(|url| !url.is_empty()))
        .bind(service.is_active)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(service_id = id, name, "service created");
        Ok(id)
    }

    pub async fn set_active(&self, id: i64, is_active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE services SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("service"));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                let in_use = e
                    .as_database_error()
                    .map_or(false, |db| db.is_foreign_key_violation());
                if in_use {
                    AppError::Conflict("Service has orders and cannot be deleted".to_string())
                } else {
                    AppError::Persistence(e)
                }
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("service"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(fixtures("services"))]
    async fn only_active_services_are_listed_publicly(pool: sqlx::SqlitePool) {
        let services = ServiceManager::new(&pool);

        let active = services.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Screen repair");
        assert_eq!(services.list_all().await.unwrap().len(), 2);
    }

    #[sqlx::test]
    async fn create_toggle_delete(pool: sqlx::SqlitePool) {
        let services = ServiceManager::new(&pool);

        let id = services
            .create(NewService {
                name: " Battery swap ",
                description: "New battery",
                price: 25.0,
                image_url: Some(""),
                is_active: false,
            })
            .await
            .unwrap();
        assert!(services.list_active().await.unwrap().is_empty());

        services.set_active(id, true).await.unwrap();
        let active = services.list_active().await.unwrap();
        assert_eq!(active[0].name, "Battery swap");
        assert!(active[0].image_url.is_none());

        services.delete(id).await.unwrap();
        assert!(matches!(
            services.delete(id).await,
            Err(AppError::NotFound("service"))
        ));
        assert!(matches!(
            services.set_active(id, true).await,
            Err(AppError::NotFound("service"))
        ));
    }

    #[sqlx::test(fixtures("users", "services", "orders"))]
    async fn ordered_service_cannot_be_deleted(pool: sqlx::SqlitePool) {
        assert!(matches!(
            ServiceManager::new(&pool).delete(1).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[sqlx::test]
    async fn create_validates(pool: sqlx::SqlitePool) {
        let services = ServiceManager::new(&pool);
        let bad_price = NewService {
            name: "x",
            description: "y",
            price: -1.0,
            image_url: None,
            is_active: true,
        };
        assert!(matches!(
            services.create(bad_price).await,
            Err(AppError::Validation(_))
        ));
        let no_name = NewService {
            name: "  ",
            description: "y",
            price: 1.0,
            image_url: None,
            is_active: true,
        };
        assert!(matches!(
            services.create(no_name).await,
            Err(AppError::Validation(_))
        ));
    }
}
