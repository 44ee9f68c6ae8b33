/*!

This is the long-form manual for `nonmono_irv` and `irvaudit`.

## Checks

Each check asks whether a small change to the ballots can produce an
anomaly in an instant-runoff election. The answer is the smallest number of
ballots to change (the *margin*), or the statement that no such change
exists.

| task | check | question |
|------|-------|----------|
| `0`  | promotion | can ranking the winner *higher* on some ballots make them lose? |
| `1`  | demotion | can ranking a loser *lower* on some ballots make them win? |
| `2`  | add loser at bottom | can adding ballots that rank a loser *last* make them win? |
| `3`  | remove winner at bottom | can removing ballots that rank the winner *last* make them lose? |

The demotion and add-loser checks look at every loser in candidate order.
By default they stop at the first loser that can be made to win. With
`--all-losers` every loser is checked and the smallest margin is reported.

## Verdicts

- `PASS`: the search finished and no anomaly exists.
- `FAIL`: an anomaly was found. The margin and a witness elimination order
  are reported.
- `NOT-APPLICABLE`: the solver refused the problem.
- `INCONCLUSIVE`: the time limit was reached before any anomaly was found.
  The margin is only known to lie within the reported bracket.

## Method

The search enumerates elimination orders as a tree: every node is a partial
order, earliest eliminated first. For each node, an integer program computes
the smallest number of ballot changes after which IRV eliminates the
candidates in exactly that order. This number is a lower bound for all the
completions of the order. Complete orders give upper bounds. Nodes are
expanded best first and discarded as soon as they cannot beat the best
complete order found so far.

In each round, the eliminated candidate must have fewer votes than every
candidate still standing, by at least `0.01` votes. With `--allow-ties` equal
tallies are accepted.

The first eliminated candidates are solved like every other node, so each of
them counts in "IPs solved". A search over `n` candidates therefore reports at
least `n - 1` programs even when nothing is found below them. Tools that seed
the tree without solving these first nodes report smaller counts for the same
election.

`--tlimit` bounds each search. The remaining time is passed to the solver
with every program, which stops when it runs out. The margin is then reported
as an interval: the smallest distance still open in the tree, and the best
complete order found so far.

## Ballot file format

```text
Alice,Bob,Charlie
Party A,Party B,Party C
-
(Alice,Bob,Charlie):39
(Bob,Charlie,Alice):35
(Charlie,Alice):26
```

- line 1: the candidates. Their position gives their index.
- line 2: one party per candidate.
- line 3: ignored.
- then one line per ranking, most preferred first, with its number of
  ballots. Repeated names on a line are ignored. Identical rankings are
  merged.

## Configuration file

All the command line settings can be stored in a JSON file and passed with
`--config`. Command line flags take precedence.

```json
{
  "ballotFile": "ballots.txt",
  "task": 1,
  "testAllLosers": true,
  "allowTies": false,
  "timeLimitSeconds": 600,
  "output": "summary.json"
}
```

A relative `ballotFile` is read from the directory of the configuration
file.

*/
