use anyhow::Context as _;
use mb_core::models::{NewPost, NewUser, Page, Post, SearchResults, User};
use mb_services::Microblog;
use serde::Serialize;

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Microblog administration")]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Register a user
    Register { username: String, email: String },

    /// Publish a post as USERNAME
    Post {
        username: String,
        body: String,
        /// Language code stored with the post
        #[arg(long)]
        language: Option<String>,
    },

    /// Make FOLLOWER follow FOLLOWED
    Follow { follower: String, followed: String },

    /// Make FOLLOWER stop following FOLLOWED
    Unfollow { follower: String, followed: String },

    /// Show the posts USERNAME sees: their own and everyone they follow
    Feed {
        username: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Defaults to feed.posts_per_page
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Full-text search over posts
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Rebuild the search index from the database
    Reindex,
}

pub struct CommandContext<'a> {
    pub app: &'a Microblog,
    pub json: bool,
    pub posts_per_page: u32,
}

impl Commands {
    pub async fn invoke(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        match self {
            Self::Register { username, email } => {
                let user = ctx.app.register_user(NewUser::new(username, email)).await?;
                ctx.display(&user, |u| format!("registered {} (id {})", u.username, u.id))
            }
            Self::Post { username, body, language } => {
                let author = ctx.user(username).await?;
                let mut post = NewPost::new(author.id, body);
                if let Some(language) = language {
                    post = post.with_language(language);
                }
                let post = ctx.app.create_post(post).await?;
                ctx.display(&post, |p| format!("posted {} as {username}", p.id))
            }
            Self::Follow { follower, followed } => {
                let (a, b) = (ctx.user(follower).await?, ctx.user(followed).await?);
                let created = ctx.app.follow(a.id, b.id).await?;
                ctx.display(&created, |created| {
                    if *created {
                        format!("{follower} now follows {followed}")
                    } else {
                        format!("{follower} already follows {followed}")
                    }
                })
            }
            Self::Unfollow { follower, followed } => {
                let (a, b) = (ctx.user(follower).await?, ctx.user(followed).await?);
                let removed = ctx.app.unfollow(a.id, b.id).await?;
                ctx.display(&removed, |removed| {
                    if *removed {
                        format!("{follower} no longer follows {followed}")
                    } else {
                        format!("{follower} was not following {followed}")
                    }
                })
            }
            Self::Feed { username, page, per_page } => {
                let user = ctx.user(username).await?;
                let per_page = per_page.unwrap_or(ctx.posts_per_page);
                let feed = ctx.app.following_feed(user.id, *page, per_page).await?;
                ctx.display(&feed, render_page)
            }
            Self::Search { query, page, per_page } => {
                let per_page = per_page.unwrap_or(ctx.posts_per_page);
                let results = ctx.app.search(query, *page, per_page).await?;
                ctx.display(&results, render_results)
            }
            Self::Reindex => {
                let total = ctx.app.reindex().await.context("reindex failed")?;
                ctx.display(&total, |n| format!("indexed {n} posts"))
            }
        }
    }
}

impl CommandContext<'_> {
    async fn user(&self, username: &str) -> anyhow::Result<User> {
        self.app
            .user_by_username(username)
            .await?
            .with_context(|| format!("no user named {username:?}"))
    }

    fn display<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }
}

fn render_post(post: &Post) -> String {
    format!("#{} [{}] user {}: {}", post.id, post.created_at.format("%Y-%m-%d %H:%M"), post.author_id, post.body)
}

fn render_page(page: &Page<Post>) -> String {
    let mut lines: Vec<String> = page.items.iter().map(render_post).collect();
    if lines.is_empty() {
        lines.push("no posts".into());
    }
    if let Some(next) = page.next_page() {
        lines.push(format!("more on page {next}"));
    }
    lines.join("\n")
}

fn render_results(results: &SearchResults) -> String {
    let mut lines: Vec<String> = results.posts.iter().map(render_post).collect();
    lines.push(format!("{} matching posts", results.total));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};
    use mb_db_sqlite::SqliteRepo;
    use std::sync::Arc;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_feed_paging_flags() {
        let cli = Cli::parse_from(["microblog", "--json", "feed", "oleg", "--page", "2", "--per-page", "5"]);
        assert!(cli.json);
        match cli.command {
            Commands::Feed { username, page, per_page } => {
                assert_eq!(username, "oleg");
                assert_eq!(page, 2);
                assert_eq!(per_page, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    async fn app() -> Microblog {
        let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
        Microblog::new(Arc::new(repo), None).unwrap()
    }

    #[tokio::test]
    async fn commands_resolve_users_by_name() {
        let app = app().await;
        let ctx = CommandContext { app: &app, json: false, posts_per_page: 25 };

        for (username, email) in [("oleg", "oleg@example.com"), ("dina", "dina@example.com")] {
            let register = Commands::Register { username: username.into(), email: email.into() };
            register.invoke(&ctx).await.unwrap();
        }
        let follow = Commands::Follow { follower: "oleg".into(), followed: "dina".into() };
        follow.invoke(&ctx).await.unwrap();

        let oleg = app.user_by_username("oleg").await.unwrap().unwrap();
        let dina = app.user_by_username("dina").await.unwrap().unwrap();
        assert!(app.is_following(oleg.id, dina.id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_username_is_reported() {
        let app = app().await;
        let ctx = CommandContext { app: &app, json: true, posts_per_page: 25 };

        let post = Commands::Post { username: "ghost".into(), body: "boo".into(), language: None };
        let err = post.invoke(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("no user named \"ghost\""));
    }
}
