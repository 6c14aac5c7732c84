//! 离线决策客户端
//!
//! MockLlmClient：把最后一条 user 消息回显为最终回答，无需 API 即可跑通 CLI。
//! ScriptedLlmClient：按顺序返回预设回复并记录每次收到的对话，供测试驱动完整编排。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{AssistantReply, DecisionOptions, LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::tools::ToolDeclaration;

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn propose(
        &self,
        messages: &[Message],
        _tools: &[ToolDeclaration],
        _options: &DecisionOptions,
    ) -> Result<AssistantReply, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");
        Ok(AssistantReply::text(format!("Echo from Mock: {last_user}")))
    }
}

/// 脚本化客户端：回复耗尽后返回 LlmError::Request
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<AssistantReply, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    declared_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self::from_results(replies.into_iter().map(Ok).collect())
    }

    pub fn from_results(replies: Vec<Result<AssistantReply, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: AssistantReply) {
        lock(&self.replies).push_back(Ok(reply));
    }

    /// 每次调用时看到的完整对话
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    /// 每次调用时声明的工具名
    pub fn declared_tools(&self) -> Vec<Vec<String>> {
        lock(&self.declared_tools).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn propose(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
        _options: &DecisionOptions,
    ) -> Result<AssistantReply, LlmError> {
        lock(&self.requests).push(messages.to_vec());
        lock(&self.declared_tools).push(tools.iter().map(|t| t.name.clone()).collect());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string())))
    }
}
